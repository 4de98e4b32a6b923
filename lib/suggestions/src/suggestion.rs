//! AI suggestion model.

use cargolink_core::{SuggestionId, UserId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle status of a suggestion. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    /// Awaiting a routing or review decision.
    Pending,
    /// Approved as generated.
    Approved,
    /// Rejected with a reason.
    Rejected,
    /// Approved with reviewer edits.
    Edited,
}

impl SuggestionStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A suggestion produced by an automation, awaiting or past review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    /// Unique identifier.
    pub id: SuggestionId,
    /// The workflow instance that produced the suggestion.
    pub workflow_instance_id: WorkflowInstanceId,
    /// The producing node, when the suggestion came from a workflow node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Suggestion type tag (e.g. "email_draft", "next_step").
    pub suggestion_type: String,
    /// Type-specific payload.
    pub suggestion_data: JsonValue,
    /// Automation confidence in [0, 1].
    pub confidence_score: f64,
    /// Lifecycle status.
    pub status: SuggestionStatus,
    /// Who approved (absent for auto-approval).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    /// When the suggestion was approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Why the suggestion was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Reviewer-edited payload, when status is `Edited`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_data: Option<JsonValue>,
    /// Role the suggestion was escalated to, when routed below the review
    /// threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// When the suggestion was submitted.
    pub created_at: DateTime<Utc>,
}

impl AiSuggestion {
    /// Returns true if the suggestion is in a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the payload the automation should act on: the reviewer's
    /// edits when present, otherwise the generated data.
    #[must_use]
    pub fn effective_data(&self) -> &JsonValue {
        self.edited_data.as_ref().unwrap_or(&self.suggestion_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> AiSuggestion {
        AiSuggestion {
            id: SuggestionId::new(),
            workflow_instance_id: WorkflowInstanceId::new(),
            node_id: None,
            suggestion_type: "email_draft".to_string(),
            suggestion_data: json!({ "subject": "Re: ETA" }),
            confidence_score: 0.8,
            status: SuggestionStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            edited_data: None,
            assigned_to: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!SuggestionStatus::Pending.is_terminal());
        assert!(SuggestionStatus::Approved.is_terminal());
        assert!(SuggestionStatus::Rejected.is_terminal());
        assert!(SuggestionStatus::Edited.is_terminal());
    }

    #[test]
    fn effective_data_prefers_edits() {
        let mut suggestion = pending();
        assert_eq!(suggestion.effective_data(), &json!({ "subject": "Re: ETA" }));

        suggestion.edited_data = Some(json!({ "subject": "Re: ETA (updated)" }));
        assert_eq!(
            suggestion.effective_data(),
            &json!({ "subject": "Re: ETA (updated)" })
        );
    }

    #[test]
    fn serde_roundtrip() {
        let suggestion = pending();
        let json = serde_json::to_string(&suggestion).expect("serialize");
        let parsed: AiSuggestion = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(suggestion, parsed);
    }
}
