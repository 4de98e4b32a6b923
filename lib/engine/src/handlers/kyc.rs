//! KYC check handler.

use crate::context::ExecutionContext;
use crate::handler::{ExternalServiceError, HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, WorkflowNode};
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::debug;

/// Verdict returned by a KYC provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycVerdict {
    /// Whether the subject passed the check.
    pub verified: bool,
    /// Provider risk classification (e.g. "low", "high").
    pub risk_level: String,
    /// Free-form provider notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Seam to the KYC screening provider.
#[async_trait]
pub trait KycProvider: Send + Sync {
    /// Screens a subject record.
    async fn check(&self, subject: &JsonValue) -> Result<KycVerdict, ExternalServiceError>;
}

/// Screens the record at the configured context path and merges the verdict
/// under `kyc`.
pub struct KycCheckHandler {
    provider: Arc<dyn KycProvider>,
}

impl KycCheckHandler {
    /// Creates the handler over a KYC provider.
    #[must_use]
    pub fn new(provider: Arc<dyn KycProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl NodeHandler for KycCheckHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::KycCheck { subject_path } = &node.config else {
            return HandlerOutcome::failed(format!("node {} is not a kyc_check node", node.id));
        };

        let Some(subject) = context.get_path(subject_path) else {
            return HandlerOutcome::failed(format!(
                "no KYC subject at context path '{subject_path}'"
            ));
        };

        debug!(%subject_path, "running kyc check");
        match self.provider.check(subject).await {
            Ok(verdict) => HandlerOutcome::completed_with(json!({
                "kyc": {
                    "verified": verdict.verified,
                    "risk_level": verdict.risk_level,
                    "notes": verdict.notes,
                },
            })),
            Err(e) => e.into(),
        }
    }
}
