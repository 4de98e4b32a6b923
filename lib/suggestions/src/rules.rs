//! Approval rules and confidence routing.

use crate::error::SuggestionError;
use serde::{Deserialize, Serialize};

/// Confidence thresholds governing where a submitted suggestion goes.
///
/// Ordering invariant, checked at construction:
/// `auto_approve_threshold >= require_review_threshold >= escalate_below_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRules {
    /// At or above this, the suggestion is applied without human review.
    pub auto_approve_threshold: f64,
    /// At or above this (but below auto-approval), the suggestion queues
    /// for ordinary review.
    pub require_review_threshold: f64,
    /// Marks confidence considered unreliable; kept at or below the review
    /// threshold so the tiers stay ordered.
    pub escalate_below_threshold: f64,
    /// Role low-confidence suggestions are escalated to.
    pub escalate_to_role: String,
}

impl ApprovalRules {
    /// Creates rules after validating ranges and the ordering invariant.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any threshold is outside [0, 1] or the
    /// ordering invariant does not hold.
    pub fn new(
        auto_approve_threshold: f64,
        require_review_threshold: f64,
        escalate_below_threshold: f64,
        escalate_to_role: impl Into<String>,
    ) -> Result<Self, SuggestionError> {
        let rules = Self {
            auto_approve_threshold,
            require_review_threshold,
            escalate_below_threshold,
            escalate_to_role: escalate_to_role.into(),
        };
        rules.validate()?;
        Ok(rules)
    }

    /// Checks ranges and the threshold ordering invariant.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first violated constraint.
    pub fn validate(&self) -> Result<(), SuggestionError> {
        for (name, value) in [
            ("auto_approve_threshold", self.auto_approve_threshold),
            ("require_review_threshold", self.require_review_threshold),
            ("escalate_below_threshold", self.escalate_below_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(SuggestionError::validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.auto_approve_threshold < self.require_review_threshold
            || self.require_review_threshold < self.escalate_below_threshold
        {
            return Err(SuggestionError::validation(
                "thresholds must satisfy auto_approve >= require_review >= escalate_below",
            ));
        }
        Ok(())
    }

    /// Routes a confidence score to its tier.
    #[must_use]
    pub fn route(&self, confidence: f64) -> RoutingDecision {
        if confidence >= self.auto_approve_threshold {
            RoutingDecision::AutoApproved
        } else if confidence >= self.require_review_threshold {
            RoutingDecision::Queued
        } else {
            RoutingDecision::Escalated {
                assigned_to: self.escalate_to_role.clone(),
            }
        }
    }
}

/// Where a submitted suggestion was routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "routing", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Applied immediately, no human review.
    AutoApproved,
    /// Queued for ordinary review.
    Queued,
    /// Queued and assigned to the escalation role.
    Escalated {
        /// Role responsible for the review.
        assigned_to: String,
    },
}

impl RoutingDecision {
    /// Strictness rank of the tier, for the monotonicity property: a higher
    /// confidence must never land in a higher-ranked (stricter) tier.
    #[must_use]
    pub fn strictness(&self) -> u8 {
        match self {
            Self::AutoApproved => 0,
            Self::Queued => 1,
            Self::Escalated { .. } => 2,
        }
    }
}
