//! Built-in node handlers and their collaborator seams.
//!
//! Each handler backs one [`crate::node::NodeKind`] and talks to external
//! systems only through the trait seams defined alongside it, so tests and
//! embedded deployments can substitute fakes without touching the dispatcher.

pub mod action;
pub mod ai;
pub mod crm;
pub mod document;
pub mod kyc;
pub mod manual_entry;
pub mod notify;
pub mod schema;

pub use action::{ActionClient, ActionHandler};
pub use ai::{
    AiEmailDraftHandler, AiNextStepHandler, DraftService, EmailDraft, NextStepRecommendation,
    SuggestionSink, SuggestionSubmission,
};
pub use crm::{CrmClient, CrmLookupHandler, CrmUpdateHandler};
pub use document::{
    DocumentRecord, DocumentRequestHandler, DocumentStatus, DocumentStore,
    InMemoryDocumentStore,
};
pub use kyc::{KycCheckHandler, KycProvider, KycVerdict};
pub use manual_entry::ManualEntryHandler;
pub use notify::{MessageChannel, NotifyHandler};
pub use schema::SchemaValidationHandler;
