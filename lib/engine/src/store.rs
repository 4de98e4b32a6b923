//! Persistence seams for definitions and instances.
//!
//! The engine only talks to these traits; production wires them to the
//! relational store, tests and embedded deployments use the in-memory
//! implementations.

use crate::definition::{DefinitionStatus, WorkflowDefinition};
use crate::error::StoreError;
use crate::instance::{EntityBinding, WorkflowInstance};
use async_trait::async_trait;
use cargolink_core::{WorkflowDefinitionId, WorkflowInstanceId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for definition storage, keyed by (id, version).
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Inserts a definition version.
    async fn insert(&self, definition: WorkflowDefinition) -> Result<(), StoreError>;

    /// Gets a specific definition version.
    async fn get(
        &self,
        id: WorkflowDefinitionId,
        version: u32,
    ) -> Result<Option<WorkflowDefinition>, StoreError>;

    /// Gets the highest active version of a definition.
    async fn latest_active(
        &self,
        id: WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, StoreError>;

    /// Gets the highest version of a definition regardless of status.
    async fn latest(
        &self,
        id: WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, StoreError>;
}

/// Trait for instance storage.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Inserts an instance.
    async fn insert(&self, instance: WorkflowInstance) -> Result<(), StoreError>;

    /// Gets an instance by ID.
    async fn get(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Updates an instance.
    async fn update(&self, instance: WorkflowInstance) -> Result<(), StoreError>;

    /// Lists instances bound to a business entity.
    async fn list_for_entity(
        &self,
        entity: &EntityBinding,
    ) -> Result<Vec<WorkflowInstance>, StoreError>;
}

/// In-memory definition store.
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    definitions: RwLock<HashMap<(WorkflowDefinitionId, u32), WorkflowDefinition>>,
}

impl InMemoryDefinitionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn insert(&self, definition: WorkflowDefinition) -> Result<(), StoreError> {
        self.definitions
            .write()
            .await
            .insert((definition.id, definition.version), definition);
        Ok(())
    }

    async fn get(
        &self,
        id: WorkflowDefinitionId,
        version: u32,
    ) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self.definitions.read().await.get(&(id, version)).cloned())
    }

    async fn latest_active(
        &self,
        id: WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| d.id == id && d.status == DefinitionStatus::Active)
            .max_by_key(|d| d.version)
            .cloned())
    }

    async fn latest(
        &self,
        id: WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| d.id == id)
            .max_by_key(|d| d.version)
            .cloned())
    }
}

/// In-memory instance store.
#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: RwLock<HashMap<WorkflowInstanceId, WorkflowInstance>>,
}

impl InMemoryInstanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn insert(&self, instance: WorkflowInstance) -> Result<(), StoreError> {
        self.instances.write().await.insert(instance.id, instance);
        Ok(())
    }

    async fn get(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn update(&self, instance: WorkflowInstance) -> Result<(), StoreError> {
        self.instances.write().await.insert(instance.id, instance);
        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity: &EntityBinding,
    ) -> Result<Vec<WorkflowInstance>, StoreError> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|i| &i.entity == entity)
            .cloned()
            .collect())
    }
}
