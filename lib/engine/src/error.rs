//! Error types for the engine crate.
//!
//! The taxonomy mirrors the platform-wide one: validation, not-found, and
//! conflict. Handler-local failures and fatal dispatcher faults are not
//! errors at this level — they are converted into execution-log and error
//! entries by the dispatcher and surface through `instance.errors`.

use crate::node::NodeId;
use cargolink_core::{ManualEntryId, WorkflowDefinitionId, WorkflowInstanceId};
use std::fmt;

/// Errors from definition graph validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Two nodes share an ID.
    DuplicateNode { node_id: NodeId },
    /// An edge references a node not present in the definition.
    DanglingEdge { node_id: NodeId },
    /// The definition does not have exactly one start node.
    StartNodeCount { found: usize },
    /// The graph contains a cycle.
    CycleDetected,
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingEdge { node_id } => {
                write!(f, "edge references missing node: {node_id}")
            }
            Self::StartNodeCount { found } => {
                write!(f, "definition must have exactly one start node, found {found}")
            }
            Self::CycleDetected => write!(f, "definition graph contains a cycle"),
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Errors from store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed.
    Backend { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { message } => write!(f, "store backend error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors surfaced by the instance manager and manual-entry service.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed input (failed schema validation, missing required field).
    Validation { message: String },
    /// Unknown definition version.
    DefinitionNotFound {
        id: WorkflowDefinitionId,
        version: Option<u32>,
    },
    /// Unknown instance.
    InstanceNotFound { id: WorkflowInstanceId },
    /// Unknown manual-entry record.
    EntryNotFound { id: ManualEntryId },
    /// Illegal state transition (starting a draft definition, resuming a
    /// terminal instance, resubmitting a completed entry).
    Conflict { message: String },
    /// Definition validation failure.
    Definition(DefinitionError),
    /// Store backend failure.
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "validation failed: {message}"),
            Self::DefinitionNotFound { id, version } => match version {
                Some(v) => write!(f, "definition not found: {id} v{v}"),
                None => write!(f, "definition not found: {id}"),
            },
            Self::InstanceNotFound { id } => write!(f, "instance not found: {id}"),
            Self::EntryNotFound { id } => write!(f, "manual entry not found: {id}"),
            Self::Conflict { message } => write!(f, "conflict: {message}"),
            Self::Definition(e) => write!(f, "invalid definition: {e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DefinitionError> for EngineError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display() {
        let err = EngineError::Conflict {
            message: "definition has no active version".to_string(),
        };
        assert!(err.to_string().contains("conflict"));
        assert!(err.to_string().contains("no active version"));
    }

    #[test]
    fn definition_error_converts() {
        let err: EngineError = DefinitionError::CycleDetected.into();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn instance_not_found_display() {
        let id = WorkflowInstanceId::new();
        let err = EngineError::InstanceNotFound { id };
        assert!(err.to_string().contains("instance not found"));
    }
}
