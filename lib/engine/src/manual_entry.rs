//! Manual data-entry records and submission service.
//!
//! A manual-entry node suspends its instance until a human fills the form.
//! At most one non-superseded record exists per (instance, node) pair:
//! re-executing the node reuses the existing record instead of creating a
//! duplicate, which is what makes resume re-entry idempotent.

use crate::error::{EngineError, StoreError};
use crate::instance::WorkflowInstance;
use crate::manager::InstanceManager;
use crate::node::NodeId;
use crate::schema::FormSchema;
use async_trait::async_trait;
use cargolink_core::{ManualEntryId, UserId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status of a manual-entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for a human submission.
    Pending,
    /// Data submitted and validated.
    Completed,
}

/// A per-(instance, node) manual-entry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntryRecord {
    /// Unique identifier.
    pub id: ManualEntryId,
    /// The owning instance.
    pub instance_id: WorkflowInstanceId,
    /// The manual-entry node within that instance.
    pub node_id: NodeId,
    /// Schema the submission must conform to.
    pub form_schema: FormSchema,
    /// Submitted data, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_data: Option<JsonValue>,
    /// Who submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<UserId>,
    /// Record status.
    pub status: EntryStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ManualEntryRecord {
    /// Creates a pending record for an (instance, node) pair.
    #[must_use]
    pub fn new(
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        form_schema: FormSchema,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ManualEntryId::new(),
            instance_id,
            node_id,
            form_schema,
            submitted_data: None,
            submitted_by: None,
            status: EntryStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trait for manual-entry persistence.
#[async_trait]
pub trait ManualEntryStore: Send + Sync {
    /// Inserts a record.
    async fn insert(&self, record: ManualEntryRecord) -> Result<(), StoreError>;

    /// Gets a record by ID.
    async fn get(&self, id: ManualEntryId) -> Result<Option<ManualEntryRecord>, StoreError>;

    /// Finds the record for an (instance, node) pair.
    async fn find_for_node(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<Option<ManualEntryRecord>, StoreError>;

    /// Updates a record.
    async fn update(&self, record: ManualEntryRecord) -> Result<(), StoreError>;
}

/// In-memory manual-entry store.
#[derive(Default)]
pub struct InMemoryManualEntryStore {
    records: RwLock<HashMap<ManualEntryId, ManualEntryRecord>>,
}

impl InMemoryManualEntryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManualEntryStore for InMemoryManualEntryStore {
    async fn insert(&self, record: ManualEntryRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: ManualEntryId) -> Result<Option<ManualEntryRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_for_node(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<Option<ManualEntryRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.instance_id == instance_id && r.node_id == node_id)
            .cloned())
    }

    async fn update(&self, record: ManualEntryRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }
}

/// Submission service for manual-entry records.
///
/// Submission validates against the record's form schema, marks the record
/// completed, and resumes the owning instance through the instance manager.
pub struct ManualEntryService {
    store: Arc<dyn ManualEntryStore>,
    manager: Arc<InstanceManager>,
}

impl ManualEntryService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn ManualEntryStore>, manager: Arc<InstanceManager>) -> Self {
        Self { store, manager }
    }

    /// Submits form data for a pending entry and resumes the owning
    /// instance.
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` for an unknown entry ID
    /// - `Conflict` if the entry is already completed
    /// - `Validation` if the data violates the form schema
    pub async fn submit(
        &self,
        entry_id: ManualEntryId,
        data: JsonValue,
        user_id: UserId,
    ) -> Result<WorkflowInstance, EngineError> {
        let mut record = self
            .store
            .get(entry_id)
            .await?
            .ok_or(EngineError::EntryNotFound { id: entry_id })?;

        if record.status == EntryStatus::Completed {
            return Err(EngineError::Conflict {
                message: format!("manual entry {entry_id} is already completed"),
            });
        }

        let violations = record.form_schema.violations(&data);
        if !violations.is_empty() {
            return Err(EngineError::Validation {
                message: violations.join("; "),
            });
        }

        record.submitted_data = Some(data.clone());
        record.submitted_by = Some(user_id);
        record.status = EntryStatus::Completed;
        record.updated_at = Utc::now();
        let instance_id = record.instance_id;
        self.store.update(record).await?;

        tracing::info!(%entry_id, %instance_id, %user_id, "manual entry submitted, resuming instance");

        self.manager
            .resume(instance_id, json!({ "manual_entry": data }))
            .await
    }
}
