//! Workflow instance model and execution log.
//!
//! An instance is one running execution of a definition bound to a business
//! entity. Instances are pinned to the definition version they started with,
//! are only mutated by the dispatcher and instance manager, and are never
//! deleted (the execution log is the audit trail).

use crate::context::ExecutionContext;
use crate::node::NodeId;
use cargolink_core::{WorkflowDefinitionId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created but the dispatcher loop has not run yet.
    NotStarted,
    /// The dispatcher loop is advancing through nodes.
    InProgress,
    /// Suspended at a wait-capable node, or paused by an operator.
    Paused,
    /// Terminal: the graph was exhausted.
    Completed,
    /// Terminal: a node failed beyond its retry policy or a fatal workflow
    /// error occurred.
    Failed,
    /// Terminal: cancelled by an operator.
    Cancelled,
}

impl InstanceStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The business entity an instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Shipment,
    Thread,
    Customer,
}

/// Binding of an instance to the business object driving the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBinding {
    /// Entity type.
    pub entity_type: EntityType,
    /// Opaque entity identifier owned by the business store.
    pub entity_id: String,
}

impl EntityBinding {
    /// Creates a binding.
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

/// Outcome recorded for one node execution in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// The node completed and the loop advanced.
    Completed,
    /// The node requested suspension.
    Suspended,
    /// The node failed (possibly pending a retry).
    Failed,
    /// The suspended node's deadline expired and the timeout edge was taken.
    TimedOut,
}

/// One append-only execution-log entry.
///
/// Input and output are full context snapshots, so the log supports replay
/// and audit without reference to live instance state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// The node this entry describes.
    pub node_id: NodeId,
    /// Outcome of the attempt.
    pub status: LogStatus,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    pub finished_at: DateTime<Utc>,
    /// Context snapshot the node observed.
    pub input: JsonValue,
    /// Context snapshot after the node's output merge, if it completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    /// Error message, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry in the instance's error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceErrorEntry {
    /// The node the error occurred at.
    pub node_id: NodeId,
    /// Error message.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
    /// How many retries had been attempted when this error was recorded.
    pub retry_count: u32,
}

/// A running (or finished) execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier.
    pub id: WorkflowInstanceId,
    /// The definition this instance executes.
    pub definition_id: WorkflowDefinitionId,
    /// The definition version pinned at start time.
    pub definition_version: u32,
    /// The business entity driving the process.
    pub entity: EntityBinding,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// The node the dispatcher is at (or suspended on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    /// Accumulated execution context (latest snapshot).
    pub context: ExecutionContext,
    /// Append-only execution log.
    pub execution_log: Vec<ExecutionLogEntry>,
    /// Errors recorded against nodes.
    pub errors: Vec<InstanceErrorEntry>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Creates a new instance pinned to a definition version.
    #[must_use]
    pub fn new(
        definition_id: WorkflowDefinitionId,
        definition_version: u32,
        entity: EntityBinding,
        initial_context: ExecutionContext,
    ) -> Self {
        Self {
            id: WorkflowInstanceId::new(),
            definition_id,
            definition_version,
            entity,
            status: InstanceStatus::NotStarted,
            current_node_id: None,
            context: initial_context,
            execution_log: Vec::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Appends an execution-log entry.
    pub fn log(&mut self, entry: ExecutionLogEntry) {
        self.execution_log.push(entry);
    }

    /// Records an error against a node.
    pub fn record_error(&mut self, node_id: NodeId, message: impl Into<String>, retry_count: u32) {
        self.errors.push(InstanceErrorEntry {
            node_id,
            message: message.into(),
            timestamp: Utc::now(),
            retry_count,
        });
    }

    /// Marks the instance completed.
    pub fn complete(&mut self) {
        self.status = InstanceStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the instance failed.
    pub fn fail(&mut self) {
        self.status = InstanceStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the instance cancelled.
    pub fn cancel(&mut self) {
        self.status = InstanceStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Returns true if the instance is in a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
