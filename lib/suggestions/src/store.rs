//! Suggestion persistence seam.

use crate::error::SuggestionError;
use crate::suggestion::{AiSuggestion, SuggestionStatus};
use async_trait::async_trait;
use cargolink_core::{SuggestionId, WorkflowInstanceId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Filters for listing suggestions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionFilter {
    /// Match a specific status.
    pub status: Option<SuggestionStatus>,
    /// Match a specific workflow instance.
    pub workflow_instance_id: Option<WorkflowInstanceId>,
    /// Match a suggestion type tag.
    pub suggestion_type: Option<String>,
    /// Match an escalation assignment.
    pub assigned_to: Option<String>,
}

impl SuggestionFilter {
    /// Matches everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to a status.
    #[must_use]
    pub fn with_status(mut self, status: SuggestionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to a workflow instance.
    #[must_use]
    pub fn for_instance(mut self, instance_id: WorkflowInstanceId) -> Self {
        self.workflow_instance_id = Some(instance_id);
        self
    }

    /// Restricts to a suggestion type.
    #[must_use]
    pub fn of_type(mut self, suggestion_type: impl Into<String>) -> Self {
        self.suggestion_type = Some(suggestion_type.into());
        self
    }

    /// Returns true if a suggestion passes the filter.
    #[must_use]
    pub fn matches(&self, suggestion: &AiSuggestion) -> bool {
        self.status.is_none_or(|s| suggestion.status == s)
            && self
                .workflow_instance_id
                .is_none_or(|i| suggestion.workflow_instance_id == i)
            && self
                .suggestion_type
                .as_deref()
                .is_none_or(|t| suggestion.suggestion_type == t)
            && self
                .assigned_to
                .as_deref()
                .is_none_or(|a| suggestion.assigned_to.as_deref() == Some(a))
    }
}

/// Trait for suggestion storage.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Inserts a suggestion.
    async fn insert(&self, suggestion: AiSuggestion) -> Result<(), SuggestionError>;

    /// Gets a suggestion by ID.
    async fn get(&self, id: SuggestionId) -> Result<Option<AiSuggestion>, SuggestionError>;

    /// Updates a suggestion.
    async fn update(&self, suggestion: AiSuggestion) -> Result<(), SuggestionError>;

    /// Lists suggestions matching a filter, oldest first.
    async fn list(&self, filter: &SuggestionFilter) -> Result<Vec<AiSuggestion>, SuggestionError>;
}

/// In-memory suggestion store.
#[derive(Default)]
pub struct InMemorySuggestionStore {
    suggestions: RwLock<HashMap<SuggestionId, AiSuggestion>>,
}

impl InMemorySuggestionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn insert(&self, suggestion: AiSuggestion) -> Result<(), SuggestionError> {
        self.suggestions
            .write()
            .await
            .insert(suggestion.id, suggestion);
        Ok(())
    }

    async fn get(&self, id: SuggestionId) -> Result<Option<AiSuggestion>, SuggestionError> {
        Ok(self.suggestions.read().await.get(&id).cloned())
    }

    async fn update(&self, suggestion: AiSuggestion) -> Result<(), SuggestionError> {
        self.suggestions
            .write()
            .await
            .insert(suggestion.id, suggestion);
        Ok(())
    }

    async fn list(&self, filter: &SuggestionFilter) -> Result<Vec<AiSuggestion>, SuggestionError> {
        let mut matched: Vec<AiSuggestion> = self
            .suggestions
            .read()
            .await
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.created_at);
        Ok(matched)
    }
}
