//! Notification handler.

use crate::context::ExecutionContext;
use crate::handler::{ExternalServiceError, HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, WorkflowNode};
use crate::template;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use std::sync::Arc;
use tracing::debug;

/// Seam to outbound messaging (email, WhatsApp, internal chat).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Sends a message over the named channel.
    async fn send(
        &self,
        channel: &str,
        recipient: &str,
        message: &str,
    ) -> Result<(), ExternalServiceError>;
}

/// Sends a template-resolved notification and completes.
///
/// Delivery is at-least-once: a retried node may send the message again.
pub struct NotifyHandler {
    channel: Arc<dyn MessageChannel>,
}

impl NotifyHandler {
    /// Creates the handler over a message channel.
    #[must_use]
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NodeHandler for NotifyHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::Notify {
            channel,
            recipient,
            message,
        } = &node.config
        else {
            return HandlerOutcome::failed(format!("node {} is not a notify node", node.id));
        };

        let recipient = template::resolve(recipient, context);
        let message = template::resolve(message, context);
        debug!(%channel, %recipient, "sending notification");
        match self.channel.send(channel, &recipient, &message).await {
            Ok(()) => HandlerOutcome::completed(),
            Err(e) => e.into(),
        }
    }
}
