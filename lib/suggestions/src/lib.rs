//! AI suggestion approval layer for the cargolink platform.
//!
//! Automations submit suggestions (email drafts, next-step recommendations)
//! with a confidence score. The router applies the configured approval
//! rules: high confidence auto-approves, middling confidence queues for
//! human review, low confidence escalates to a named role. Reviewers then
//! approve (optionally with edits) or reject, and the originating automation
//! is notified exactly once per terminal transition.

pub mod error;
pub mod router;
pub mod rules;
pub mod store;
pub mod suggestion;

pub use error::SuggestionError;
pub use router::{
    BulkItemOutcome, BulkOutcome, NewSuggestion, SubmitOutcome, SuggestionEvent,
    SuggestionNotifier, SuggestionRouter, SuggestionStats,
};
pub use rules::{ApprovalRules, RoutingDecision};
pub use store::{InMemorySuggestionStore, SuggestionFilter, SuggestionStore};
pub use suggestion::{AiSuggestion, SuggestionStatus};
