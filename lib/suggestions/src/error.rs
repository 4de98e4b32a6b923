//! Suggestion routing error types.

use cargolink_core::SuggestionId;
use std::fmt;

/// Errors raised by the suggestion router and its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionError {
    /// Malformed input (confidence out of range, empty rejection reason).
    Validation {
        /// What was wrong.
        message: String,
    },
    /// Unknown suggestion ID.
    NotFound {
        /// The ID that was looked up.
        id: SuggestionId,
    },
    /// Illegal state transition, e.g. approving a terminal suggestion.
    Conflict {
        /// What was attempted.
        message: String,
    },
    /// The suggestion store backend failed.
    Store {
        /// Backend message.
        message: String,
    },
}

impl SuggestionError {
    /// Validation error from a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Conflict error from a message.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

impl fmt::Display for SuggestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "validation error: {message}"),
            Self::NotFound { id } => write!(f, "suggestion {id} not found"),
            Self::Conflict { message } => write!(f, "conflict: {message}"),
            Self::Store { message } => write!(f, "suggestion store error: {message}"),
        }
    }
}

impl std::error::Error for SuggestionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_the_id() {
        let id = SuggestionId::new();
        let err = SuggestionError::NotFound { id };
        assert!(err.to_string().contains(&id.to_string()));
    }
}
