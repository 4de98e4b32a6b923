//! Due index for suspended workflow nodes.
//!
//! When the instance manager suspends a node with a deadline policy, it
//! registers the node here. The index expands the policy into due entries:
//! at most one timeout entry and one recurring reminder entry per
//! (instance, node) pair. The sweeper periodically scans the index and fires
//! whatever has come due.

use crate::error::EscalationError;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use cargolink_engine::{DeadlinePolicy, DeadlineSink, NodeId, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// What a due entry does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DueKind {
    /// Recurring reminder while the node stays suspended.
    Reminder {
        /// Hours between reminders.
        interval_hours: u32,
    },
    /// One-shot timeout that moves the instance along its timeout edge.
    Timeout {
        /// Role the timeout escalates to.
        escalate_to: Option<String>,
    },
}

/// One entry in the due index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueEntry {
    /// The suspended instance.
    pub instance_id: WorkflowInstanceId,
    /// The suspended node.
    pub node_id: NodeId,
    /// What firing does.
    pub due_kind: DueKind,
    /// When the entry first comes due.
    pub due_at: DateTime<Utc>,
    /// When the entry last fired (reminders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl DueEntry {
    /// Returns true if the entry should fire at `now`.
    ///
    /// A reminder that already fired is due again only after a full interval
    /// since the last firing, so overlapping sweeps cannot double-remind.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match (&self.due_kind, self.last_fired_at) {
            (_, None) => self.due_at <= now,
            (DueKind::Reminder { interval_hours }, Some(last)) => {
                last + Duration::hours(i64::from(*interval_hours)) <= now
            }
            // A fired timeout never fires again.
            (DueKind::Timeout { .. }, Some(_)) => false,
        }
    }
}

/// Trait for due index persistence.
#[async_trait]
pub trait DueIndexStore: Send + Sync {
    /// Inserts or replaces an entry for its (instance, node, kind) slot.
    async fn upsert(&self, entry: DueEntry) -> Result<(), StoreError>;

    /// Removes all entries for an (instance, node) pair.
    async fn remove(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<(), StoreError>;

    /// Returns every entry that is due at `now`.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<DueEntry>, StoreError>;

    /// Records that an entry fired at `now`.
    async fn mark_fired(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        kind: &DueKind,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

fn slot(kind: &DueKind) -> u8 {
    match kind {
        DueKind::Reminder { .. } => 0,
        DueKind::Timeout { .. } => 1,
    }
}

/// In-memory due index.
#[derive(Default)]
pub struct InMemoryDueIndex {
    entries: RwLock<HashMap<(WorkflowInstanceId, NodeId, u8), DueEntry>>,
}

impl InMemoryDueIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DueIndexStore for InMemoryDueIndex {
    async fn upsert(&self, entry: DueEntry) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            (entry.instance_id, entry.node_id, slot(&entry.due_kind)),
            entry,
        );
        Ok(())
    }

    async fn remove(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .retain(|(i, n, _), _| !(*i == instance_id && *n == node_id));
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<DueEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect())
    }

    async fn mark_fired(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        kind: &DueKind,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(entry) = self
            .entries
            .write()
            .await
            .get_mut(&(instance_id, node_id, slot(kind)))
        {
            entry.last_fired_at = Some(now);
        }
        Ok(())
    }
}

/// Registers deadlines into a due index on behalf of the instance manager.
pub struct DeadlineRegistrar {
    index: std::sync::Arc<dyn DueIndexStore>,
}

impl DeadlineRegistrar {
    /// Creates a registrar over a due index.
    #[must_use]
    pub fn new(index: std::sync::Arc<dyn DueIndexStore>) -> Self {
        Self { index }
    }

    /// Expands a deadline policy into due entries starting from `now`.
    pub async fn register_at(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        policy: &DeadlinePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        if let Some(minutes) = policy.timeout_minutes {
            self.index
                .upsert(DueEntry {
                    instance_id,
                    node_id,
                    due_kind: DueKind::Timeout {
                        escalate_to: policy.escalate_to.clone(),
                    },
                    due_at: now + Duration::minutes(i64::from(minutes)),
                    last_fired_at: None,
                })
                .await?;
        }
        if let Some(hours) = policy.reminder_after_hours {
            self.index
                .upsert(DueEntry {
                    instance_id,
                    node_id,
                    due_kind: DueKind::Reminder {
                        interval_hours: hours,
                    },
                    due_at: now + Duration::hours(i64::from(hours)),
                    last_fired_at: None,
                })
                .await?;
        }
        debug!(%instance_id, %node_id, "deadline registered");
        Ok(())
    }
}

#[async_trait]
impl DeadlineSink for DeadlineRegistrar {
    async fn register(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        policy: DeadlinePolicy,
    ) -> Result<(), StoreError> {
        self.register_at(instance_id, node_id, &policy, Utc::now())
            .await
            .map_err(|e| StoreError::Backend {
                message: e.to_string(),
            })
    }

    async fn clear(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<(), StoreError> {
        self.index.remove(instance_id, node_id).await
    }
}
