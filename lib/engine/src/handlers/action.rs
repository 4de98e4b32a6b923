//! Generic action handler.

use crate::context::ExecutionContext;
use crate::handler::{ExternalServiceError, HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, WorkflowNode};
use crate::template;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Seam to whatever performs named operations (internal services, webhooks).
#[async_trait]
pub trait ActionClient: Send + Sync {
    /// Performs an operation with template-resolved parameters. A returned
    /// value is merged into the context.
    async fn perform(
        &self,
        operation: &str,
        params: &JsonValue,
    ) -> Result<Option<JsonValue>, ExternalServiceError>;
}

/// Performs a named operation through the action client.
pub struct ActionHandler {
    client: Arc<dyn ActionClient>,
}

impl ActionHandler {
    /// Creates the handler over an action client.
    #[must_use]
    pub fn new(client: Arc<dyn ActionClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for ActionHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::Action { operation, params } = &node.config else {
            return HandlerOutcome::failed(format!("node {} is not an action node", node.id));
        };

        let resolved = template::resolve_value(params, context);
        debug!(%operation, "performing action");
        match self.client.perform(operation, &resolved).await {
            Ok(Some(output)) => HandlerOutcome::completed_with(output),
            Ok(None) => HandlerOutcome::completed(),
            Err(e) => e.into(),
        }
    }
}
