//! Schema validation handler.

use crate::context::ExecutionContext;
use crate::handler::{HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, WorkflowNode};
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde_json::json;

/// Validates the context value at the configured path against a form schema.
///
/// Stateless: validation failures are node failures, so the node's retry
/// policy or fallback decides whether the instance survives bad data.
pub struct SchemaValidationHandler;

#[async_trait]
impl NodeHandler for SchemaValidationHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::SchemaValidation {
            target_path,
            schema,
        } = &node.config
        else {
            return HandlerOutcome::failed(format!(
                "node {} is not a schema_validation node",
                node.id
            ));
        };

        let Some(target) = context.get_path(target_path) else {
            return HandlerOutcome::failed(format!(
                "nothing to validate at context path '{target_path}'"
            ));
        };

        let violations = schema.violations(target);
        if violations.is_empty() {
            HandlerOutcome::completed_with(json!({
                "validation": { "target": target_path, "valid": true },
            }))
        } else {
            HandlerOutcome::failed(format!(
                "schema validation failed at '{target_path}': {}",
                violations.join("; ")
            ))
        }
    }
}
