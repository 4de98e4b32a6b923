//! Workflow instance manager.
//!
//! Owns the instance lifecycle: start, resume, pause, cancel, and the
//! timeout transition driven by the escalation service. Exactly one
//! dispatcher loop may be active per instance at any time; the manager
//! enforces this with an instance-scoped exclusive lock, so a retried
//! external callback arriving twice concurrently cannot duplicate node
//! execution.

use crate::definition::WorkflowDefinition;
use crate::dispatcher::{Dispatcher, TIMEOUT_LABEL};
use crate::error::{EngineError, StoreError};
use crate::instance::{
    EntityBinding, ExecutionLogEntry, InstanceStatus, LogStatus, WorkflowInstance,
};
use crate::node::{DeadlinePolicy, NodeId};
use crate::store::{DefinitionStore, InstanceStore};
use async_trait::async_trait;
use cargolink_core::{WorkflowDefinitionId, WorkflowInstanceId};
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Where the manager registers deadlines for suspended nodes.
///
/// Implemented by the escalation service; a manager without a sink simply
/// runs workflows without timeout supervision.
#[async_trait]
pub trait DeadlineSink: Send + Sync {
    /// Registers a deadline for a freshly suspended node.
    async fn register(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        policy: DeadlinePolicy,
    ) -> Result<(), StoreError>;

    /// Clears any deadline for a node that is no longer suspended.
    async fn clear(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<(), StoreError>;
}

/// The workflow instance manager.
pub struct InstanceManager {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    dispatcher: Dispatcher,
    deadline_sink: Option<Arc<dyn DeadlineSink>>,
    locks: Mutex<HashMap<WorkflowInstanceId, Arc<Mutex<()>>>>,
}

impl InstanceManager {
    /// Creates a manager over the given stores and dispatcher.
    #[must_use]
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            definitions,
            instances,
            dispatcher,
            deadline_sink: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a deadline sink for timeout supervision.
    #[must_use]
    pub fn with_deadline_sink(mut self, sink: Arc<dyn DeadlineSink>) -> Self {
        self.deadline_sink = Some(sink);
        self
    }

    /// Starts a new instance against the latest active version of a
    /// definition and runs it until suspension or termination.
    ///
    /// The definition version is pinned on the instance; later edits to the
    /// definition never affect it.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionNotFound` for an unknown definition, `Conflict`
    /// if versions exist but none is active (draft or archived only), or
    /// `Definition` if the graph fails validation.
    pub async fn start(
        &self,
        definition_id: WorkflowDefinitionId,
        entity: EntityBinding,
        initial_context: JsonValue,
    ) -> Result<WorkflowInstance, EngineError> {
        let Some(definition) = self.definitions.latest_active(definition_id).await? else {
            return Err(match self.definitions.latest(definition_id).await? {
                Some(_) => EngineError::Conflict {
                    message: format!("definition {definition_id} has no active version"),
                },
                None => EngineError::DefinitionNotFound {
                    id: definition_id,
                    version: None,
                },
            });
        };
        definition.validate()?;

        let mut instance = WorkflowInstance::new(
            definition.id,
            definition.version,
            entity,
            crate::context::ExecutionContext::from_value(initial_context),
        );
        self.instances.insert(instance.clone()).await?;
        info!(instance_id = %instance.id, definition_id = %definition.id, version = definition.version, "instance started");

        let lock = self.lock_for(instance.id).await;
        let _guard = lock.lock().await;
        self.dispatcher.run(&definition, &mut instance).await;
        self.finish_transition(&definition, &mut instance, None).await?;
        Ok(instance)
    }

    /// Resumes a paused instance with an external input event.
    ///
    /// The event is merged into the context, then the handler of the
    /// current node is re-invoked (idempotently) and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` for an unknown ID and `Conflict` if the
    /// instance is not paused.
    pub async fn resume(
        &self,
        instance_id: WorkflowInstanceId,
        input_event: JsonValue,
    ) -> Result<WorkflowInstance, EngineError> {
        let lock = self.lock_for(instance_id).await;
        let _guard = lock.lock().await;

        let mut instance = self.load(instance_id).await?;
        if instance.status != InstanceStatus::Paused {
            return Err(EngineError::Conflict {
                message: format!(
                    "instance {instance_id} is not paused (status: {:?})",
                    instance.status
                ),
            });
        }
        let suspended_node = instance.current_node_id;

        let definition = self.definition_for(&instance).await?;
        instance.context = instance.context.merged(&input_event);
        info!(%instance_id, "resuming instance");
        self.dispatcher.run(&definition, &mut instance).await;
        self.finish_transition(&definition, &mut instance, suspended_node)
            .await?;
        Ok(instance)
    }

    /// Takes the timeout edge of a suspended node.
    ///
    /// Called by the escalation service when a deadline expires. The
    /// instance moves along the node's `timeout`-labeled edge and the loop
    /// continues from there.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the instance is not paused at the given node
    /// or the node declares no timeout edge.
    pub async fn timeout(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<WorkflowInstance, EngineError> {
        let lock = self.lock_for(instance_id).await;
        let _guard = lock.lock().await;

        let mut instance = self.load(instance_id).await?;
        if instance.status != InstanceStatus::Paused || instance.current_node_id != Some(node_id) {
            return Err(EngineError::Conflict {
                message: format!("instance {instance_id} is not suspended at node {node_id}"),
            });
        }

        let definition = self.definition_for(&instance).await?;
        let Some(edge) = definition.outgoing_labeled(node_id, TIMEOUT_LABEL) else {
            return Err(EngineError::Conflict {
                message: format!("node {node_id} declares no timeout edge"),
            });
        };

        warn!(%instance_id, %node_id, "deadline expired, taking timeout edge");
        instance.log(ExecutionLogEntry {
            node_id,
            status: LogStatus::TimedOut,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            input: instance.context.to_value(),
            output: None,
            error: None,
        });
        instance.current_node_id = Some(edge.target);
        self.dispatcher.run(&definition, &mut instance).await;
        self.finish_transition(&definition, &mut instance, Some(node_id))
            .await?;
        Ok(instance)
    }

    /// Administrative pause, distinct from a handler-requested wait.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the instance is already terminal.
    pub async fn pause(
        &self,
        instance_id: WorkflowInstanceId,
    ) -> Result<WorkflowInstance, EngineError> {
        let lock = self.lock_for(instance_id).await;
        let _guard = lock.lock().await;

        let mut instance = self.load(instance_id).await?;
        if instance.is_terminal() {
            return Err(EngineError::Conflict {
                message: format!("instance {instance_id} is already terminal"),
            });
        }
        instance.status = InstanceStatus::Paused;
        self.instances.update(instance.clone()).await?;
        info!(%instance_id, "instance paused by operator");
        Ok(instance)
    }

    /// Cancels an instance regardless of its current node.
    ///
    /// Already-performed side effects are not reversed; at-least-once side
    /// effects are accepted by design.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the instance is already terminal.
    pub async fn cancel(
        &self,
        instance_id: WorkflowInstanceId,
    ) -> Result<WorkflowInstance, EngineError> {
        let lock = self.lock_for(instance_id).await;
        let _guard = lock.lock().await;

        let mut instance = self.load(instance_id).await?;
        if instance.is_terminal() {
            return Err(EngineError::Conflict {
                message: format!("instance {instance_id} is already terminal"),
            });
        }
        let suspended_node = instance.current_node_id;
        instance.cancel();
        self.instances.update(instance.clone()).await?;
        if let (Some(sink), Some(node_id)) = (&self.deadline_sink, suspended_node) {
            sink.clear(instance_id, node_id).await?;
        }
        info!(%instance_id, "instance cancelled");
        Ok(instance)
    }

    /// Gets an instance by ID.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` for an unknown ID.
    pub async fn get(
        &self,
        instance_id: WorkflowInstanceId,
    ) -> Result<WorkflowInstance, EngineError> {
        self.load(instance_id).await
    }

    /// Lists instances bound to a business entity.
    ///
    /// # Errors
    ///
    /// Returns a store error if the backend fails.
    pub async fn list_for_entity(
        &self,
        entity: &EntityBinding,
    ) -> Result<Vec<WorkflowInstance>, EngineError> {
        Ok(self.instances.list_for_entity(entity).await?)
    }

    /// Persists the post-loop instance state and reconciles deadlines.
    async fn finish_transition(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        previously_suspended: Option<NodeId>,
    ) -> Result<(), EngineError> {
        self.instances.update(instance.clone()).await?;

        let Some(sink) = &self.deadline_sink else {
            return Ok(());
        };

        let now_suspended = (instance.status == InstanceStatus::Paused)
            .then_some(instance.current_node_id)
            .flatten();

        if let Some(node_id) = previously_suspended
            && now_suspended != Some(node_id)
        {
            sink.clear(instance.id, node_id).await?;
        }

        if let Some(node_id) = now_suspended
            && now_suspended != previously_suspended
            && let Some(policy) = effective_deadline(definition, node_id)
        {
            sink.register(instance.id, node_id, policy).await?;
        }

        Ok(())
    }

    async fn load(
        &self,
        instance_id: WorkflowInstanceId,
    ) -> Result<WorkflowInstance, EngineError> {
        self.instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound { id: instance_id })
    }

    async fn definition_for(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .get(instance.definition_id, instance.definition_version)
            .await?
            .ok_or(EngineError::DefinitionNotFound {
                id: instance.definition_id,
                version: Some(instance.definition_version),
            })
    }

    async fn lock_for(&self, instance_id: WorkflowInstanceId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(instance_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Resolves the deadline policy for a suspended node: the node's own policy
/// wins, otherwise the definition's SLA defaults apply.
fn effective_deadline(
    definition: &WorkflowDefinition,
    node_id: NodeId,
) -> Option<DeadlinePolicy> {
    let node = definition.node(node_id)?;
    if let Some(policy) = &node.deadline {
        return Some(policy.clone());
    }
    let sla = definition.sla_config.as_ref()?;
    if sla.default_timeout_minutes.is_none() && sla.default_reminder_hours.is_none() {
        return None;
    }
    Some(DeadlinePolicy {
        timeout_minutes: sla.default_timeout_minutes,
        reminder_after_hours: sla.default_reminder_hours,
        escalate_to: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::definition::{WorkflowEdge, skeleton};
    use crate::handler::{HandlerOutcome, HandlerRegistry, NodeHandler};
    use crate::instance::EntityType;
    use crate::node::{NodeConfig, NodeKind, WorkflowNode};
    use crate::store::{InMemoryDefinitionStore, InMemoryInstanceStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Suspends until the context contains `manual_entry`, counting how many
    /// times the side effect actually runs.
    struct WaitForEntryHandler {
        effects: AtomicU32,
    }

    #[async_trait]
    impl NodeHandler for WaitForEntryHandler {
        async fn execute(
            &self,
            _node: &WorkflowNode,
            _instance_id: WorkflowInstanceId,
            context: &ExecutionContext,
        ) -> HandlerOutcome {
            if let Some(data) = context.get("manual_entry") {
                return HandlerOutcome::completed_with(json!({ "entry": data.clone() }));
            }
            self.effects.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome::suspended("waiting for manual entry")
        }
    }

    fn waiting_definition() -> crate::definition::WorkflowDefinition {
        let (mut definition, start, end) = skeleton("Waiting");
        let wait = definition.add_node(WorkflowNode::new(
            "wait",
            NodeConfig::Action {
                operation: "wait".to_string(),
                params: json!({}),
            },
        ));
        definition.add_edge(WorkflowEdge::new(start, wait));
        definition.add_edge(WorkflowEdge::new(wait, end));
        definition.activate();
        definition
    }

    async fn manager_with(
        definition: crate::definition::WorkflowDefinition,
        handler: Arc<dyn NodeHandler>,
    ) -> InstanceManager {
        let definitions = Arc::new(InMemoryDefinitionStore::new());
        definitions.insert(definition).await.unwrap();
        let mut registry = HandlerRegistry::new();
        registry.register(NodeKind::Action, handler);
        InstanceManager::new(
            definitions,
            Arc::new(InMemoryInstanceStore::new()),
            Dispatcher::new(registry),
        )
    }

    fn binding() -> EntityBinding {
        EntityBinding::new(EntityType::Shipment, "SHP-77")
    }

    #[tokio::test]
    async fn start_runs_to_suspension_and_resume_completes() {
        let definition = waiting_definition();
        let definition_id = definition.id;
        let handler = Arc::new(WaitForEntryHandler {
            effects: AtomicU32::new(0),
        });
        let manager = manager_with(definition, handler.clone()).await;

        let instance = manager
            .start(definition_id, binding(), json!({ "shipment": "SHP-77" }))
            .await
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Paused);

        let resumed = manager
            .resume(instance.id, json!({ "manual_entry": { "incoterm": "FOB" } }))
            .await
            .unwrap();
        assert_eq!(resumed.status, InstanceStatus::Completed);
        assert_eq!(
            resumed.context.get_path("entry.incoterm"),
            Some(&json!("FOB"))
        );
        // The suspend-side effect ran exactly once.
        assert_eq!(handler.effects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_without_active_definition_is_not_found() {
        let manager = manager_with(
            waiting_definition(),
            Arc::new(WaitForEntryHandler {
                effects: AtomicU32::new(0),
            }),
        )
        .await;

        let err = manager
            .start(WorkflowDefinitionId::new(), binding(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DefinitionNotFound { .. }));
    }

    #[tokio::test]
    async fn start_of_draft_only_definition_is_conflict() {
        let (mut definition, start, end) = skeleton("Unpublished");
        definition.add_edge(WorkflowEdge::new(start, end));
        let definition_id = definition.id;
        let manager = manager_with(
            definition,
            Arc::new(WaitForEntryHandler {
                effects: AtomicU32::new(0),
            }),
        )
        .await;

        let err = manager
            .start(definition_id, binding(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert!(err.to_string().contains("no active version"));
    }

    #[tokio::test]
    async fn resume_of_non_paused_instance_is_conflict() {
        let definition = waiting_definition();
        let definition_id = definition.id;
        let manager = manager_with(
            definition,
            Arc::new(WaitForEntryHandler {
                effects: AtomicU32::new(0),
            }),
        )
        .await;

        let instance = manager
            .start(definition_id, binding(), json!({}))
            .await
            .unwrap();
        manager
            .resume(instance.id, json!({ "manual_entry": {} }))
            .await
            .unwrap();

        let err = manager
            .resume(instance.id, json!({ "manual_entry": {} }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn cancel_is_immediate_and_terminal_cancel_conflicts() {
        let definition = waiting_definition();
        let definition_id = definition.id;
        let manager = manager_with(
            definition,
            Arc::new(WaitForEntryHandler {
                effects: AtomicU32::new(0),
            }),
        )
        .await;

        let instance = manager
            .start(definition_id, binding(), json!({}))
            .await
            .unwrap();
        let cancelled = manager.cancel(instance.id).await.unwrap();
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);

        let err = manager.cancel(instance.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn concurrent_resumes_serialize_on_the_instance_lock() {
        let definition = waiting_definition();
        let definition_id = definition.id;
        let handler = Arc::new(WaitForEntryHandler {
            effects: AtomicU32::new(0),
        });
        let manager = Arc::new(manager_with(definition, handler.clone()).await);

        let instance = manager
            .start(definition_id, binding(), json!({}))
            .await
            .unwrap();

        let a = {
            let manager = manager.clone();
            let id = instance.id;
            tokio::spawn(async move {
                manager.resume(id, json!({ "manual_entry": { "n": 1 } })).await
            })
        };
        let b = {
            let manager = manager.clone();
            let id = instance.id;
            tokio::spawn(async move {
                manager.resume(id, json!({ "manual_entry": { "n": 2 } })).await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        // Exactly one resume wins; the other sees a non-paused instance.
        assert_eq!(ok_count, 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(EngineError::Conflict { .. })))
        );

        let final_state = manager.get(instance.id).await.unwrap();
        assert_eq!(final_state.status, InstanceStatus::Completed);
    }

    #[tokio::test]
    async fn pinned_version_survives_later_edits() {
        let definition = waiting_definition();
        let definition_id = definition.id;
        let definitions = Arc::new(InMemoryDefinitionStore::new());
        definitions.insert(definition.clone()).await.unwrap();

        let mut registry = HandlerRegistry::new();
        registry.register(
            NodeKind::Action,
            Arc::new(WaitForEntryHandler {
                effects: AtomicU32::new(0),
            }),
        );
        let manager = InstanceManager::new(
            definitions.clone(),
            Arc::new(InMemoryInstanceStore::new()),
            Dispatcher::new(registry),
        );

        let instance = manager
            .start(definition_id, binding(), json!({}))
            .await
            .unwrap();
        assert_eq!(instance.definition_version, 1);

        // Publish a v2 with a different graph; the paused instance stays on v1.
        let mut v2 = definition;
        v2.version = 2;
        definitions.insert(v2).await.unwrap();

        let resumed = manager
            .resume(instance.id, json!({ "manual_entry": {} }))
            .await
            .unwrap();
        assert_eq!(resumed.definition_version, 1);
        assert_eq!(resumed.status, InstanceStatus::Completed);
    }
}
