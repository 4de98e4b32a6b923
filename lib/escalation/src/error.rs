//! Escalation error types.

use cargolink_engine::{EngineError, StoreError};
use std::fmt;

/// Errors raised by the escalation service.
#[derive(Debug)]
pub enum EscalationError {
    /// The due index backend failed.
    Store(StoreError),
    /// An engine lifecycle operation failed.
    Engine(EngineError),
}

impl fmt::Display for EscalationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "due index error: {e}"),
            Self::Engine(e) => write!(f, "engine error: {e}"),
        }
    }
}

impl std::error::Error for EscalationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Engine(e) => Some(e),
        }
    }
}

impl From<StoreError> for EscalationError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<EngineError> for EscalationError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}
