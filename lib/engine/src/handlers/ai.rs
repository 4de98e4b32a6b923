//! AI drafting handlers.
//!
//! These nodes never act on their own output. The generated draft or
//! recommendation is submitted to the suggestion sink together with the
//! model's confidence score; the approval layer behind the sink decides
//! whether it auto-applies, queues for review, or escalates. The node itself
//! completes immediately so the workflow keeps moving.

use crate::context::ExecutionContext;
use crate::handler::{ExternalServiceError, HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, NodeId, WorkflowNode};
use crate::template;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::info;

/// An email draft produced by the drafting model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

/// A next-step recommendation produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStepRecommendation {
    /// Recommended action tag.
    pub action: String,
    /// Why the model recommends it.
    pub rationale: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

/// Seam to the drafting model.
#[async_trait]
pub trait DraftService: Send + Sync {
    /// Drafts an outbound email from a resolved prompt and context snapshot.
    async fn draft_email(
        &self,
        prompt: &str,
        context: &JsonValue,
    ) -> Result<EmailDraft, ExternalServiceError>;

    /// Recommends the next process step.
    async fn next_step(
        &self,
        prompt: &str,
        context: &JsonValue,
    ) -> Result<NextStepRecommendation, ExternalServiceError>;
}

/// A suggestion handed to the approval layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionSubmission {
    /// The instance the suggestion belongs to.
    pub instance_id: WorkflowInstanceId,
    /// The node that produced it.
    pub node_id: NodeId,
    /// Suggestion type tag (e.g. "email_draft", "next_step").
    pub suggestion_type: String,
    /// Type-specific payload.
    pub data: JsonValue,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

/// Where AI handlers submit their suggestions.
///
/// The lookup side makes re-entry idempotent: a node that already submitted
/// for this (instance, node) pair returns the recorded payload instead of
/// generating and submitting again.
#[async_trait]
pub trait SuggestionSink: Send + Sync {
    /// Returns the previously submitted payload for an (instance, node)
    /// pair, if any.
    async fn find_for_node(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<Option<JsonValue>, ExternalServiceError>;

    /// Submits a suggestion to the approval layer.
    async fn submit(&self, submission: SuggestionSubmission)
    -> Result<(), ExternalServiceError>;
}

/// Drafts an outbound email and submits it for approval.
pub struct AiEmailDraftHandler {
    drafts: Arc<dyn DraftService>,
    sink: Arc<dyn SuggestionSink>,
}

impl AiEmailDraftHandler {
    /// Creates the handler over a draft service and a suggestion sink.
    #[must_use]
    pub fn new(drafts: Arc<dyn DraftService>, sink: Arc<dyn SuggestionSink>) -> Self {
        Self { drafts, sink }
    }
}

#[async_trait]
impl NodeHandler for AiEmailDraftHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::AiEmailDraft { prompt } = &node.config else {
            return HandlerOutcome::failed(format!(
                "node {} is not an ai_email_draft node",
                node.id
            ));
        };

        match self.sink.find_for_node(instance_id, node.id).await {
            Ok(Some(existing)) => {
                return HandlerOutcome::completed_with(json!({ "email_draft": existing }));
            }
            Ok(None) => {}
            Err(e) => return e.into(),
        }

        let resolved = template::resolve(prompt, context);
        let draft = match self.drafts.draft_email(&resolved, &context.to_value()).await {
            Ok(draft) => draft,
            Err(e) => return e.into(),
        };

        let data = json!({
            "subject": draft.subject,
            "body": draft.body,
        });
        info!(%instance_id, node_id = %node.id, confidence = draft.confidence, "email draft submitted for approval");
        if let Err(e) = self
            .sink
            .submit(SuggestionSubmission {
                instance_id,
                node_id: node.id,
                suggestion_type: "email_draft".to_string(),
                data: data.clone(),
                confidence: draft.confidence,
            })
            .await
        {
            return e.into();
        }

        HandlerOutcome::completed_with(json!({ "email_draft": data }))
    }
}

/// Recommends the next process step and submits it for approval.
pub struct AiNextStepHandler {
    drafts: Arc<dyn DraftService>,
    sink: Arc<dyn SuggestionSink>,
}

impl AiNextStepHandler {
    /// Creates the handler over a draft service and a suggestion sink.
    #[must_use]
    pub fn new(drafts: Arc<dyn DraftService>, sink: Arc<dyn SuggestionSink>) -> Self {
        Self { drafts, sink }
    }
}

#[async_trait]
impl NodeHandler for AiNextStepHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::AiNextStep { prompt } = &node.config else {
            return HandlerOutcome::failed(format!(
                "node {} is not an ai_next_step node",
                node.id
            ));
        };

        match self.sink.find_for_node(instance_id, node.id).await {
            Ok(Some(existing)) => {
                return HandlerOutcome::completed_with(json!({ "next_step": existing }));
            }
            Ok(None) => {}
            Err(e) => return e.into(),
        }

        let resolved = template::resolve(prompt, context);
        let recommendation = match self.drafts.next_step(&resolved, &context.to_value()).await {
            Ok(recommendation) => recommendation,
            Err(e) => return e.into(),
        };

        let data = json!({
            "action": recommendation.action,
            "rationale": recommendation.rationale,
        });
        info!(%instance_id, node_id = %node.id, confidence = recommendation.confidence, "next-step recommendation submitted for approval");
        if let Err(e) = self
            .sink
            .submit(SuggestionSubmission {
                instance_id,
                node_id: node.id,
                suggestion_type: "next_step".to_string(),
                data: data.clone(),
                confidence: recommendation.confidence,
            })
            .await
        {
            return e.into();
        }

        HandlerOutcome::completed_with(json!({ "next_step": data }))
    }
}
