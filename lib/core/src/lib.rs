//! Core domain types and utilities for the cargolink operations platform.
//!
//! This crate provides the strongly-typed identifiers and error handling
//! foundation shared by the workflow engine, the escalation service, and
//! the AI suggestion router.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    ManualEntryId, SuggestionId, UserId, WorkflowDefinitionId, WorkflowInstanceId,
};
