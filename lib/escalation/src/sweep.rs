//! Periodic escalation sweep.
//!
//! The sweeper scans the due index and fires whatever has come due:
//! reminders notify the responsible party and stay in the index for the
//! next interval; timeouts move the instance along its timeout edge through
//! the instance manager and are then dropped. Escalation latency is bounded
//! by the sweep interval, not instantaneous.

use crate::due::{DueEntry, DueIndexStore, DueKind};
use crate::error::EscalationError;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use cargolink_engine::{EngineError, InstanceManager, NodeId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the sweeper sends reminder and escalation notifications.
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    /// A suspended node is still waiting.
    async fn remind(&self, instance_id: WorkflowInstanceId, node_id: NodeId);

    /// A suspended node timed out and was escalated.
    async fn escalated(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        escalate_to: Option<&str>,
    );
}

/// Counts of actions taken by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Reminders sent.
    pub reminders_sent: u32,
    /// Timeout edges taken.
    pub timeouts_fired: u32,
    /// Stale entries dropped (instance no longer suspended there).
    pub stale_dropped: u32,
}

/// Scans the due index and fires due entries.
pub struct Sweeper {
    index: Arc<dyn DueIndexStore>,
    manager: Arc<InstanceManager>,
    notifier: Arc<dyn EscalationNotifier>,
}

impl Sweeper {
    /// Creates a sweeper over the shared due index.
    #[must_use]
    pub fn new(
        index: Arc<dyn DueIndexStore>,
        manager: Arc<InstanceManager>,
        notifier: Arc<dyn EscalationNotifier>,
    ) -> Self {
        Self {
            index,
            manager,
            notifier,
        }
    }

    /// Runs one sweep against the current clock.
    ///
    /// # Errors
    ///
    /// Returns store errors from the due index and engine errors other than
    /// the expected staleness conflicts.
    pub async fn sweep(&self) -> Result<SweepReport, EscalationError> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as of `now`.
    ///
    /// # Errors
    ///
    /// See [`Sweeper::sweep`].
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, EscalationError> {
        let mut report = SweepReport::default();
        for entry in self.index.due(now).await? {
            match &entry.due_kind {
                DueKind::Reminder { .. } => {
                    self.notifier.remind(entry.instance_id, entry.node_id).await;
                    self.index
                        .mark_fired(entry.instance_id, entry.node_id, &entry.due_kind, now)
                        .await?;
                    report.reminders_sent += 1;
                }
                DueKind::Timeout { escalate_to } => {
                    self.fire_timeout(&entry, escalate_to.as_deref(), &mut report)
                        .await?;
                }
            }
        }
        if report != SweepReport::default() {
            info!(
                reminders = report.reminders_sent,
                timeouts = report.timeouts_fired,
                stale = report.stale_dropped,
                "escalation sweep finished"
            );
        }
        Ok(report)
    }

    async fn fire_timeout(
        &self,
        entry: &DueEntry,
        escalate_to: Option<&str>,
        report: &mut SweepReport,
    ) -> Result<(), EscalationError> {
        match self.manager.timeout(entry.instance_id, entry.node_id).await {
            Ok(_) => {
                self.notifier
                    .escalated(entry.instance_id, entry.node_id, escalate_to)
                    .await;
                self.index.remove(entry.instance_id, entry.node_id).await?;
                report.timeouts_fired += 1;
                Ok(())
            }
            // The instance moved on (resumed, cancelled) or declares no
            // timeout edge; either way the entry is stale.
            Err(
                e @ (EngineError::Conflict { .. } | EngineError::InstanceNotFound { .. }),
            ) => {
                warn!(
                    instance_id = %entry.instance_id,
                    node_id = %entry.node_id,
                    error = %e,
                    "dropping stale timeout entry"
                );
                self.index.remove(entry.instance_id, entry.node_id).await?;
                report.stale_dropped += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::due::{DeadlineRegistrar, InMemoryDueIndex};
    use async_trait::async_trait;
    use cargolink_engine::{
        Dispatcher, EntityBinding, EntityType, ExecutionContext, HandlerOutcome,
        HandlerRegistry, InMemoryDefinitionStore, InMemoryInstanceStore, InstanceStatus,
        NodeConfig, NodeHandler, NodeKind, WorkflowEdge, WorkflowNode,
        definition::skeleton, node::DeadlinePolicy, store::DefinitionStore,
    };
    use chrono::Duration;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct WaitHandler;

    #[async_trait]
    impl NodeHandler for WaitHandler {
        async fn execute(
            &self,
            _node: &WorkflowNode,
            _instance_id: WorkflowInstanceId,
            context: &ExecutionContext,
        ) -> HandlerOutcome {
            if context.get("reply").is_some() {
                HandlerOutcome::completed()
            } else {
                HandlerOutcome::suspended("waiting for customer reply")
            }
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        reminders: AtomicU32,
        escalations: AtomicU32,
        last_role: tokio::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl EscalationNotifier for CountingNotifier {
        async fn remind(&self, _instance_id: WorkflowInstanceId, _node_id: NodeId) {
            self.reminders.fetch_add(1, Ordering::SeqCst);
        }

        async fn escalated(
            &self,
            _instance_id: WorkflowInstanceId,
            _node_id: NodeId,
            escalate_to: Option<&str>,
        ) {
            self.escalations.fetch_add(1, Ordering::SeqCst);
            *self.last_role.lock().await = escalate_to.map(str::to_string);
        }
    }

    struct Harness {
        manager: Arc<InstanceManager>,
        sweeper: Sweeper,
        notifier: Arc<CountingNotifier>,
        index: Arc<InMemoryDueIndex>,
        definition_id: cargolink_core::WorkflowDefinitionId,
    }

    /// Wires a definition with one deadline-bearing wait node and a timeout
    /// edge straight to the end node.
    async fn harness(policy: DeadlinePolicy) -> Harness {
        let (mut definition, start, end) = skeleton("Chase reply");
        let wait = definition.add_node(
            WorkflowNode::new(
                "Wait for reply",
                NodeConfig::Action {
                    operation: "wait".to_string(),
                    params: json!({}),
                },
            )
            .with_deadline(policy),
        );
        definition.add_edge(WorkflowEdge::new(start, wait));
        definition.add_edge(WorkflowEdge::new(wait, end));
        definition.add_edge(WorkflowEdge::labeled(wait, end, "timeout"));
        definition.activate();
        let definition_id = definition.id;

        let definitions = Arc::new(InMemoryDefinitionStore::new());
        definitions.insert(definition).await.unwrap();

        let index: Arc<InMemoryDueIndex> = Arc::new(InMemoryDueIndex::new());
        let mut registry = HandlerRegistry::new();
        registry.register(NodeKind::Action, Arc::new(WaitHandler));
        let manager = Arc::new(
            InstanceManager::new(
                definitions,
                Arc::new(InMemoryInstanceStore::new()),
                Dispatcher::new(registry),
            )
            .with_deadline_sink(Arc::new(DeadlineRegistrar::new(index.clone()))),
        );

        let notifier = Arc::new(CountingNotifier::default());
        let sweeper = Sweeper::new(index.clone(), manager.clone(), notifier.clone());
        Harness {
            manager,
            sweeper,
            notifier,
            index,
            definition_id,
        }
    }

    fn timeout_policy() -> DeadlinePolicy {
        DeadlinePolicy {
            timeout_minutes: Some(30),
            reminder_after_hours: None,
            escalate_to: Some("ops_manager".to_string()),
        }
    }

    fn reminder_policy() -> DeadlinePolicy {
        DeadlinePolicy {
            timeout_minutes: None,
            reminder_after_hours: Some(1),
            escalate_to: None,
        }
    }

    fn binding() -> EntityBinding {
        EntityBinding::new(EntityType::Thread, "THR-12")
    }

    #[tokio::test]
    async fn expired_timeout_takes_the_timeout_edge() {
        let h = harness(timeout_policy()).await;
        let instance = h
            .manager
            .start(h.definition_id, binding(), json!({}))
            .await
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Paused);

        let early = h.sweeper.sweep_at(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let report = h
            .sweeper
            .sweep_at(Utc::now() + Duration::minutes(31))
            .await
            .unwrap();
        assert_eq!(report.timeouts_fired, 1);
        assert_eq!(h.notifier.escalations.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.notifier.last_role.lock().await.as_deref(),
            Some("ops_manager")
        );

        let finished = h.manager.get(instance.id).await.unwrap();
        assert_eq!(finished.status, InstanceStatus::Completed);

        // The fired entry is gone.
        let again = h
            .sweeper
            .sweep_at(Utc::now() + Duration::minutes(62))
            .await
            .unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn overlapping_sweeps_send_one_reminder_per_interval() {
        let h = harness(reminder_policy()).await;
        h.manager
            .start(h.definition_id, binding(), json!({}))
            .await
            .unwrap();

        let due = Utc::now() + Duration::minutes(61);
        h.sweeper.sweep_at(due).await.unwrap();
        h.sweeper.sweep_at(due + Duration::minutes(5)).await.unwrap();
        assert_eq!(h.notifier.reminders.load(Ordering::SeqCst), 1);

        h.sweeper.sweep_at(due + Duration::minutes(61)).await.unwrap();
        assert_eq!(h.notifier.reminders.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resumed_instance_leaves_a_stale_entry_that_is_dropped() {
        let h = harness(timeout_policy()).await;
        let instance = h
            .manager
            .start(h.definition_id, binding(), json!({}))
            .await
            .unwrap();

        let wait_node = instance.current_node_id.expect("suspended node");
        let resumed = h
            .manager
            .resume(instance.id, json!({ "reply": "got it" }))
            .await
            .unwrap();
        assert_eq!(resumed.status, InstanceStatus::Completed);

        // Resume cleared the deadline through the sink.
        let report = h
            .sweeper
            .sweep_at(Utc::now() + Duration::minutes(31))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());

        // A crash between resume and clear can leave an entry behind; the
        // sweep drops it instead of timing out a completed instance.
        h.index
            .upsert(crate::due::DueEntry {
                instance_id: instance.id,
                node_id: wait_node,
                due_kind: DueKind::Timeout { escalate_to: None },
                due_at: Utc::now() - Duration::minutes(1),
                last_fired_at: None,
            })
            .await
            .unwrap();

        let report = h.sweeper.sweep_at(Utc::now()).await.unwrap();
        assert_eq!(report.stale_dropped, 1);
        assert_eq!(report.timeouts_fired, 0);
        assert_eq!(h.notifier.escalations.load(Ordering::SeqCst), 0);
    }
}
