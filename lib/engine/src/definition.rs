//! Workflow definition types.
//!
//! A definition is a named, versioned process graph. Once any instance has
//! been started against a (id, version) pair the definition is immutable:
//! edits create a new version, and running instances stay pinned to the
//! version they started with.

use crate::condition::Condition;
use crate::error::DefinitionError;
use crate::node::{NodeConfig, NodeId, NodeKind, WorkflowNode};
use cargolink_core::WorkflowDefinitionId;
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Under authoring; instances may not start against it.
    Draft,
    /// Published; instances may start against it.
    Active,
    /// Retired; running instances finish, new ones may not start.
    Archived,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Source node ID.
    pub source: NodeId,
    /// Target node ID.
    pub target: NodeId,
    /// Optional label; condition nodes route on "true"/"false", timed-out
    /// waits route on "timeout".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Optional guard conditions evaluated against context before the edge
    /// is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl WorkflowEdge {
    /// Creates an unlabeled, unconditional edge.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            label: None,
            conditions: None,
        }
    }

    /// Creates a labeled edge.
    #[must_use]
    pub fn labeled(source: NodeId, target: NodeId, label: impl Into<String>) -> Self {
        Self {
            source,
            target,
            label: Some(label.into()),
            conditions: None,
        }
    }

    /// Sets guard conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

/// What starts an instance of this definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// A business entity event (e.g. shipment created, thread received).
    EntityEvent {
        /// Entity type tag.
        entity_type: String,
        /// Event tag.
        event: String,
    },
    /// Operator-initiated.
    Manual,
}

/// Default service-level intervals inherited by wait-capable nodes that do
/// not declare their own deadline policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Default timeout for suspended nodes, in minutes.
    pub default_timeout_minutes: Option<u32>,
    /// Default reminder interval for suspended nodes, in hours.
    pub default_reminder_hours: Option<u32>,
}

/// A complete, versioned workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier (stable across versions).
    pub id: WorkflowDefinitionId,
    /// Monotonic version number per definition name.
    pub version: u32,
    /// Human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: DefinitionStatus,
    /// Process steps.
    pub nodes: Vec<WorkflowNode>,
    /// Directed edges between steps.
    pub edges: Vec<WorkflowEdge>,
    /// What starts an instance.
    pub triggers: Vec<TriggerSpec>,
    /// Default deadlines for wait-capable nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_config: Option<SlaConfig>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Creates a new draft definition at version 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowDefinitionId::new(),
            version: 1,
            name: name.into(),
            status: DefinitionStatus::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
            triggers: Vec::new(),
            sla_config: None,
            created_at: Utc::now(),
        }
    }

    /// Adds a node, returning its ID.
    pub fn add_node(&mut self, node: WorkflowNode) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Adds an edge.
    pub fn add_edge(&mut self, edge: WorkflowEdge) {
        self.edges.push(edge);
    }

    /// Marks the definition active.
    pub fn activate(&mut self) {
        self.status = DefinitionStatus::Active;
    }

    /// Returns the node with the given ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns the graph's single start node.
    #[must_use]
    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.kind() == NodeKind::Start)
    }

    /// Returns the outgoing edges of a node, in declaration order.
    #[must_use]
    pub fn outgoing(&self, id: NodeId) -> Vec<&WorkflowEdge> {
        self.edges.iter().filter(|e| e.source == id).collect()
    }

    /// Returns the outgoing edge with the given label, if any.
    #[must_use]
    pub fn outgoing_labeled(&self, id: NodeId, label: &str) -> Option<&WorkflowEdge> {
        self.edges
            .iter()
            .find(|e| e.source == id && e.label.as_deref() == Some(label))
    }

    /// Validates the definition graph.
    ///
    /// Checks that every edge references nodes present in the definition,
    /// that node IDs are unique, that exactly one start node exists, and
    /// that the graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut indices = HashMap::new();

        for node in &self.nodes {
            if indices.contains_key(&node.id) {
                return Err(DefinitionError::DuplicateNode { node_id: node.id });
            }
            indices.insert(node.id, graph.add_node(node.id));
        }

        for edge in &self.edges {
            let source = *indices
                .get(&edge.source)
                .ok_or(DefinitionError::DanglingEdge { node_id: edge.source })?;
            let target = *indices
                .get(&edge.target)
                .ok_or(DefinitionError::DanglingEdge { node_id: edge.target })?;
            graph.add_edge(source, target, ());
        }

        let start_count = self
            .nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Start)
            .count();
        if start_count != 1 {
            return Err(DefinitionError::StartNodeCount { found: start_count });
        }

        if is_cyclic_directed(&graph) {
            return Err(DefinitionError::CycleDetected);
        }

        Ok(())
    }

    /// Returns true if instances may start against this definition.
    #[must_use]
    pub fn is_startable(&self) -> bool {
        self.status == DefinitionStatus::Active
    }
}

/// Builds a two-node start/end skeleton, returning (definition, start, end).
///
/// Test and authoring convenience.
#[must_use]
pub fn skeleton(name: impl Into<String>) -> (WorkflowDefinition, NodeId, NodeId) {
    let mut definition = WorkflowDefinition::new(name);
    let start = definition.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let end = definition.add_node(WorkflowNode::new("End", NodeConfig::End));
    (definition, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_skeleton_passes_validation() {
        let (mut definition, start, end) = skeleton("Quote follow-up");
        definition.add_edge(WorkflowEdge::new(start, end));
        definition.validate().expect("should validate");
    }

    #[test]
    fn dangling_edge_fails_validation() {
        let (mut definition, start, _end) = skeleton("Broken");
        definition.add_edge(WorkflowEdge::new(start, NodeId::new()));
        let err = definition.validate().unwrap_err();
        assert!(matches!(err, DefinitionError::DanglingEdge { .. }));
    }

    #[test]
    fn missing_start_node_fails_validation() {
        let mut definition = WorkflowDefinition::new("No entry");
        definition.add_node(WorkflowNode::new("End", NodeConfig::End));
        let err = definition.validate().unwrap_err();
        assert!(matches!(err, DefinitionError::StartNodeCount { found: 0 }));
    }

    #[test]
    fn cycle_fails_validation() {
        let (mut definition, start, end) = skeleton("Loop");
        definition.add_edge(WorkflowEdge::new(start, end));
        definition.add_edge(WorkflowEdge::new(end, start));
        let err = definition.validate().unwrap_err();
        assert!(matches!(err, DefinitionError::CycleDetected));
    }

    #[test]
    fn outgoing_labeled_lookup() {
        let (mut definition, start, end) = skeleton("Labels");
        definition.add_edge(WorkflowEdge::labeled(start, end, "true"));

        assert!(definition.outgoing_labeled(start, "true").is_some());
        assert!(definition.outgoing_labeled(start, "false").is_none());
    }

    #[test]
    fn draft_definitions_are_not_startable() {
        let (mut definition, _start, _end) = skeleton("Draft");
        assert!(!definition.is_startable());
        definition.activate();
        assert!(definition.is_startable());
    }

    #[test]
    fn definition_serde_roundtrip() {
        let (mut definition, start, end) = skeleton("Roundtrip");
        definition.add_edge(WorkflowEdge::new(start, end));
        definition.triggers.push(TriggerSpec::EntityEvent {
            entity_type: "shipment".to_string(),
            event: "created".to_string(),
        });

        let json = serde_json::to_string(&definition).expect("serialize");
        let parsed: WorkflowDefinition = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(definition, parsed);
    }
}
