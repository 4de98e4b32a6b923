//! Confidence-gated suggestion router and approval state machine.

use crate::error::SuggestionError;
use crate::rules::{ApprovalRules, RoutingDecision};
use crate::store::{SuggestionFilter, SuggestionStore};
use crate::suggestion::{AiSuggestion, SuggestionStatus};
use async_trait::async_trait;
use cargolink_core::{SuggestionId, UserId, WorkflowInstanceId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Event tag sent to the originating automation on a terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionEvent {
    /// Routed above the auto-approval threshold.
    AutoApproved,
    /// Approved by a reviewer as generated.
    Approved,
    /// Approved by a reviewer with edits.
    Edited,
    /// Rejected by a reviewer.
    Rejected,
}

/// Seam back to the originating automation.
///
/// Called exactly once per terminal transition; pending routing emits
/// nothing.
#[async_trait]
pub trait SuggestionNotifier: Send + Sync {
    /// Tells the automation what happened to its suggestion.
    async fn notify(&self, suggestion: &AiSuggestion, event: SuggestionEvent);
}

/// A suggestion as submitted by an automation, before routing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSuggestion {
    /// The workflow instance that produced the suggestion.
    pub workflow_instance_id: WorkflowInstanceId,
    /// The producing node, if any.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Suggestion type tag.
    pub suggestion_type: String,
    /// Type-specific payload.
    pub suggestion_data: JsonValue,
    /// Automation confidence in [0, 1].
    pub confidence_score: f64,
}

/// Result of submitting a suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// The persisted suggestion.
    pub suggestion: AiSuggestion,
    /// Where it was routed.
    pub routing: RoutingDecision,
}

/// Per-item outcome of a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    /// The suggestion the item targeted.
    pub id: SuggestionId,
    /// The item's own result; failures never affect sibling items.
    pub result: Result<(), SuggestionError>,
}

/// Aggregate result of a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    /// Per-item outcomes in request order.
    pub items: Vec<BulkItemOutcome>,
    /// Items that succeeded.
    pub succeeded: u32,
    /// Items that failed.
    pub failed: u32,
}

impl BulkOutcome {
    fn from_items(items: Vec<BulkItemOutcome>) -> Self {
        let succeeded = items.iter().filter(|i| i.result.is_ok()).count() as u32;
        let failed = items.len() as u32 - succeeded;
        Self {
            items,
            succeeded,
            failed,
        }
    }
}

/// Counts per status plus mean confidence of the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SuggestionStats {
    /// Pending suggestions.
    pub pending: u64,
    /// Approved suggestions (auto or reviewed).
    pub approved: u64,
    /// Rejected suggestions.
    pub rejected: u64,
    /// Approved-with-edits suggestions.
    pub edited: u64,
    /// Mean confidence of pending suggestions, if any are pending.
    pub mean_pending_confidence: Option<f64>,
}

/// Routes submitted suggestions by confidence and drives the approval state
/// machine.
///
/// Has no cross-suggestion shared state beyond the read-only rules, so
/// concurrent submissions for different suggestions never contend.
pub struct SuggestionRouter {
    store: Arc<dyn SuggestionStore>,
    notifier: Arc<dyn SuggestionNotifier>,
    rules: ApprovalRules,
}

impl SuggestionRouter {
    /// Creates a router over a store and notifier with validated rules.
    #[must_use]
    pub fn new(
        store: Arc<dyn SuggestionStore>,
        notifier: Arc<dyn SuggestionNotifier>,
        rules: ApprovalRules,
    ) -> Self {
        Self {
            store,
            notifier,
            rules,
        }
    }

    /// Submits a suggestion and routes it by confidence.
    ///
    /// At or above the auto-approval threshold the suggestion is persisted
    /// already approved and the automation is notified; otherwise it is
    /// persisted pending, assigned to the escalation role when confidence
    /// falls below the review threshold.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a confidence score outside [0, 1].
    pub async fn submit(
        &self,
        new: NewSuggestion,
    ) -> Result<SubmitOutcome, SuggestionError> {
        if !new.confidence_score.is_finite() || !(0.0..=1.0).contains(&new.confidence_score) {
            return Err(SuggestionError::validation(format!(
                "confidence score must be within [0, 1], got {}",
                new.confidence_score
            )));
        }

        let routing = self.rules.route(new.confidence_score);
        let now = Utc::now();
        let mut suggestion = AiSuggestion {
            id: SuggestionId::new(),
            workflow_instance_id: new.workflow_instance_id,
            node_id: new.node_id,
            suggestion_type: new.suggestion_type,
            suggestion_data: new.suggestion_data,
            confidence_score: new.confidence_score,
            status: SuggestionStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            edited_data: None,
            assigned_to: None,
            created_at: now,
        };

        match &routing {
            RoutingDecision::AutoApproved => {
                suggestion.status = SuggestionStatus::Approved;
                suggestion.approved_at = Some(now);
            }
            RoutingDecision::Queued => {}
            RoutingDecision::Escalated { assigned_to } => {
                suggestion.assigned_to = Some(assigned_to.clone());
            }
        }

        self.store.insert(suggestion.clone()).await?;
        info!(
            suggestion_id = %suggestion.id,
            suggestion_type = %suggestion.suggestion_type,
            confidence = suggestion.confidence_score,
            ?routing,
            "suggestion submitted"
        );

        if matches!(routing, RoutingDecision::AutoApproved) {
            self.notifier
                .notify(&suggestion, SuggestionEvent::AutoApproved)
                .await;
        }

        Ok(SubmitOutcome {
            suggestion,
            routing,
        })
    }

    /// Approves a pending suggestion, optionally with reviewer edits.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown ID and `Conflict` when the
    /// suggestion is already terminal.
    pub async fn approve(
        &self,
        id: SuggestionId,
        user_id: UserId,
        edited_data: Option<JsonValue>,
    ) -> Result<AiSuggestion, SuggestionError> {
        let mut suggestion = self.load_pending(id).await?;

        suggestion.status = if edited_data.is_some() {
            SuggestionStatus::Edited
        } else {
            SuggestionStatus::Approved
        };
        suggestion.edited_data = edited_data;
        suggestion.approved_by = Some(user_id);
        suggestion.approved_at = Some(Utc::now());
        self.store.update(suggestion.clone()).await?;

        let event = if suggestion.status == SuggestionStatus::Edited {
            SuggestionEvent::Edited
        } else {
            SuggestionEvent::Approved
        };
        info!(suggestion_id = %id, %user_id, ?event, "suggestion approved");
        self.notifier.notify(&suggestion, event).await;
        Ok(suggestion)
    }

    /// Rejects a pending suggestion with a mandatory reason.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty reason, `NotFound` for an
    /// unknown ID, and `Conflict` when the suggestion is already terminal.
    pub async fn reject(
        &self,
        id: SuggestionId,
        user_id: UserId,
        reason: impl Into<String>,
    ) -> Result<AiSuggestion, SuggestionError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(SuggestionError::validation(
                "a rejection reason is required",
            ));
        }

        let mut suggestion = self.load_pending(id).await?;
        suggestion.status = SuggestionStatus::Rejected;
        suggestion.rejection_reason = Some(reason);
        self.store.update(suggestion.clone()).await?;

        info!(suggestion_id = %id, %user_id, "suggestion rejected");
        self.notifier
            .notify(&suggestion, SuggestionEvent::Rejected)
            .await;
        Ok(suggestion)
    }

    /// Approves each listed suggestion independently.
    ///
    /// No cross-item atomicity: one item's failure never rolls back or
    /// blocks the others.
    pub async fn bulk_approve(&self, ids: &[SuggestionId], user_id: UserId) -> BulkOutcome {
        let mut items = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.approve(id, user_id, None).await.map(|_| ());
            items.push(BulkItemOutcome { id, result });
        }
        BulkOutcome::from_items(items)
    }

    /// Rejects each listed suggestion independently with a shared reason.
    pub async fn bulk_reject(
        &self,
        ids: &[SuggestionId],
        user_id: UserId,
        reason: &str,
    ) -> BulkOutcome {
        let mut items = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.reject(id, user_id, reason).await.map(|_| ());
            items.push(BulkItemOutcome { id, result });
        }
        BulkOutcome::from_items(items)
    }

    /// Lists pending suggestions matching the filter.
    ///
    /// # Errors
    ///
    /// Returns store errors from the backend.
    pub async fn list_pending(
        &self,
        filter: SuggestionFilter,
    ) -> Result<Vec<AiSuggestion>, SuggestionError> {
        self.store
            .list(&filter.with_status(SuggestionStatus::Pending))
            .await
    }

    /// Aggregates counts per status and the pending queue's mean confidence.
    ///
    /// # Errors
    ///
    /// Returns store errors from the backend.
    pub async fn stats(&self) -> Result<SuggestionStats, SuggestionError> {
        let all = self.store.list(&SuggestionFilter::any()).await?;
        let mut stats = SuggestionStats::default();
        let mut pending_confidence_sum = 0.0;
        for suggestion in &all {
            match suggestion.status {
                SuggestionStatus::Pending => {
                    stats.pending += 1;
                    pending_confidence_sum += suggestion.confidence_score;
                }
                SuggestionStatus::Approved => stats.approved += 1,
                SuggestionStatus::Rejected => stats.rejected += 1,
                SuggestionStatus::Edited => stats.edited += 1,
            }
        }
        if stats.pending > 0 {
            stats.mean_pending_confidence =
                Some(pending_confidence_sum / stats.pending as f64);
        }
        Ok(stats)
    }

    async fn load_pending(&self, id: SuggestionId) -> Result<AiSuggestion, SuggestionError> {
        let suggestion = self
            .store
            .get(id)
            .await?
            .ok_or(SuggestionError::NotFound { id })?;
        if suggestion.is_terminal() {
            return Err(SuggestionError::conflict(format!(
                "suggestion {id} is already {:?}",
                suggestion.status
            )));
        }
        Ok(suggestion)
    }
}
