//! Handler contract and registry.
//!
//! Every non-structural node kind is backed by one handler implementing a
//! single contract. Suspension is a first-class outcome value rather than a
//! control-flow side effect, so the dispatcher can persist and inspect it.
//!
//! Handlers must be idempotent with respect to re-entry: suspended nodes are
//! re-invoked on every resume, so before performing a side effect a handler
//! checks whether equivalent state already exists for (instance, node) and
//! returns the cached result instead of repeating the effect.

use crate::context::ExecutionContext;
use crate::node::{NodeKind, WorkflowNode};
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The three-outcome result of a node handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The node finished; `output` is merged into the context.
    Completed { output: Option<JsonValue> },
    /// The node is waiting for external input; the dispatcher pauses the
    /// instance at this node.
    Suspended { reason: String },
    /// The node failed; the dispatcher applies the node's retry policy.
    Failed { error: String },
}

impl HandlerOutcome {
    /// Completion with no context updates.
    #[must_use]
    pub fn completed() -> Self {
        Self::Completed { output: None }
    }

    /// Completion merging `output` into the context.
    #[must_use]
    pub fn completed_with(output: JsonValue) -> Self {
        Self::Completed {
            output: Some(output),
        }
    }

    /// Suspension with a human-readable reason.
    #[must_use]
    pub fn suspended(reason: impl Into<String>) -> Self {
        Self::Suspended {
            reason: reason.into(),
        }
    }

    /// Failure with a message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

/// A failed downstream call from a handler's collaborator.
///
/// Seam clients (CRM, KYC, messaging, drafting) return this; handlers map it
/// into `HandlerOutcome::Failed` so it never propagates as a raw error past
/// the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalServiceError {
    /// The collaborator that failed.
    pub service: String,
    /// What went wrong.
    pub message: String,
}

impl ExternalServiceError {
    /// Creates an error for a named collaborator.
    #[must_use]
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExternalServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "external service error ({}): {}", self.service, self.message)
    }
}

impl std::error::Error for ExternalServiceError {}

impl From<ExternalServiceError> for HandlerOutcome {
    fn from(e: ExternalServiceError) -> Self {
        Self::Failed {
            error: e.to_string(),
        }
    }
}

/// The contract every node handler implements.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Executes the node for the given instance and context snapshot.
    async fn execute(
        &self,
        node: &WorkflowNode,
        instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome;
}

/// Maps node kind tags to handler implementations.
///
/// The dispatcher looks handlers up here; an unregistered kind is a fatal
/// workflow error for the instance that reaches it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a node kind, replacing any previous one.
    pub fn register(&mut self, kind: NodeKind, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Returns the handler registered for a kind.
    #[must_use]
    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Returns the registered kinds.
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<NodeKind> {
        self.handlers.keys().copied().collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConfig;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl NodeHandler for EchoHandler {
        async fn execute(
            &self,
            node: &WorkflowNode,
            _instance_id: WorkflowInstanceId,
            _context: &ExecutionContext,
        ) -> HandlerOutcome {
            HandlerOutcome::completed_with(json!({ "echo": node.name }))
        }
    }

    #[test]
    fn registry_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.register(NodeKind::Action, Arc::new(EchoHandler));

        assert!(registry.get(NodeKind::Action).is_some());
        assert!(registry.get(NodeKind::KycCheck).is_none());
    }

    #[tokio::test]
    async fn handler_executes_through_trait_object() {
        let mut registry = HandlerRegistry::new();
        registry.register(NodeKind::Action, Arc::new(EchoHandler));

        let node = WorkflowNode::new(
            "ping",
            NodeConfig::Action {
                operation: "noop".to_string(),
                params: json!({}),
            },
        );
        let handler = registry.get(NodeKind::Action).expect("registered");
        let outcome = handler
            .execute(&node, WorkflowInstanceId::new(), &ExecutionContext::new())
            .await;

        assert_eq!(
            outcome,
            HandlerOutcome::completed_with(json!({ "echo": "ping" }))
        );
    }

    #[test]
    fn external_service_error_maps_to_failed() {
        let outcome: HandlerOutcome = ExternalServiceError::new("crm", "timeout").into();
        match outcome {
            HandlerOutcome::Failed { error } => {
                assert!(error.contains("crm"));
                assert!(error.contains("timeout"));
            }
            _ => panic!("expected failed outcome"),
        }
    }
}
