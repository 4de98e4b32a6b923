//! Node dispatcher: the per-instance execution loop.
//!
//! The dispatcher advances one instance node-by-node until a handler
//! suspends, a node fails beyond its retry policy, or the graph is
//! exhausted. All failures become instance state (error entries plus a
//! FAILED status); nothing propagates as a raw error past this boundary.
//!
//! The caller (the instance manager) holds the per-instance lock for the
//! whole loop, so node execution within one instance is strictly
//! sequential.

use crate::condition::evaluate_all;
use crate::definition::{WorkflowDefinition, WorkflowEdge};
use crate::handler::{HandlerOutcome, HandlerRegistry};
use crate::instance::{ExecutionLogEntry, InstanceStatus, LogStatus, WorkflowInstance};
use crate::node::{NodeConfig, NodeId, WorkflowNode};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Edge label the escalation service routes through on timeout; never taken
/// during normal advancement.
pub const TIMEOUT_LABEL: &str = "timeout";

/// What the loop does after processing one node.
enum Step {
    /// Move to the next node.
    Next(NodeId),
    /// Stop the loop (suspended, failed, or completed).
    Halt,
}

/// Drives instances through their definition graphs.
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher over a handler registry.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Advances `instance` until suspension or termination.
    ///
    /// Resumption re-enters at `current_node_id`, re-invoking that node's
    /// handler; handlers are idempotent so re-entry is safe.
    pub async fn run(&self, definition: &WorkflowDefinition, instance: &mut WorkflowInstance) {
        let mut current = match instance.current_node_id {
            Some(id) => id,
            None => match definition.start_node() {
                Some(node) => node.id,
                None => {
                    warn!(instance_id = %instance.id, "definition has no start node");
                    instance.record_error(
                        NodeId::default(),
                        "definition has no start node",
                        0,
                    );
                    instance.fail();
                    return;
                }
            },
        };

        instance.status = InstanceStatus::InProgress;

        // Acyclic definitions bound the walk by node count; anything past
        // that budget means the graph invariant is broken.
        let step_budget = definition.nodes.len().max(1) * 2;
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > step_budget {
                self.fail_fatal(instance, current, "step budget exceeded, graph may be cyclic");
                return;
            }

            let Some(node) = definition.node(current) else {
                self.fail_fatal(instance, current, "current node is not in the definition");
                return;
            };

            instance.current_node_id = Some(current);
            debug!(instance_id = %instance.id, node_id = %current, kind = %node.kind(), "dispatching node");

            let step = match &node.config {
                NodeConfig::Start => self.advance(definition, instance, node),
                NodeConfig::End => {
                    info!(instance_id = %instance.id, "instance completed");
                    instance.complete();
                    Step::Halt
                }
                NodeConfig::Condition { conditions } => {
                    let taken = evaluate_all(conditions, &instance.context);
                    let label = if taken { "true" } else { "false" };
                    let started_at = Utc::now();
                    match definition.outgoing_labeled(node.id, label) {
                        Some(edge) => {
                            instance.log(ExecutionLogEntry {
                                node_id: node.id,
                                status: LogStatus::Completed,
                                started_at,
                                finished_at: Utc::now(),
                                input: instance.context.to_value(),
                                output: None,
                                error: None,
                            });
                            debug!(node_id = %node.id, label, "condition branch taken");
                            Step::Next(edge.target)
                        }
                        None => {
                            self.fail_fatal(
                                instance,
                                node.id,
                                format!("no outgoing edge labeled '{label}' and no default edge is defined"),
                            );
                            Step::Halt
                        }
                    }
                }
                _ => self.execute_handler(definition, instance, node).await,
            };

            match step {
                Step::Next(next) => current = next,
                Step::Halt => return,
            }
        }
    }

    /// Executes a registered handler with the node's retry policy.
    async fn execute_handler(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        node: &WorkflowNode,
    ) -> Step {
        let Some(handler) = self.registry.get(node.kind()) else {
            self.fail_fatal(
                instance,
                node.id,
                format!("no handler registered for node kind '{}'", node.kind()),
            );
            return Step::Halt;
        };

        let max_retries = node.retry.as_ref().map_or(0, |r| r.retries);
        let delay = node.retry.as_ref().map_or(0, |r| r.retry_delay_seconds);
        let mut attempt: u32 = 0;

        loop {
            let started_at = Utc::now();
            let input = instance.context.to_value();
            let outcome = handler
                .execute(node, instance.id, &instance.context)
                .await;

            match outcome {
                HandlerOutcome::Completed { output } => {
                    return self.complete_node(definition, instance, node, started_at, input, output);
                }
                HandlerOutcome::Suspended { reason } => {
                    info!(instance_id = %instance.id, node_id = %node.id, %reason, "instance suspended");
                    instance.log(ExecutionLogEntry {
                        node_id: node.id,
                        status: LogStatus::Suspended,
                        started_at,
                        finished_at: Utc::now(),
                        input,
                        output: None,
                        error: None,
                    });
                    instance.status = InstanceStatus::Paused;
                    instance.current_node_id = Some(node.id);
                    return Step::Halt;
                }
                HandlerOutcome::Failed { error } => {
                    warn!(instance_id = %instance.id, node_id = %node.id, %error, attempt, "node failed");
                    instance.record_error(node.id, error.clone(), attempt);
                    instance.log(ExecutionLogEntry {
                        node_id: node.id,
                        status: LogStatus::Failed,
                        started_at,
                        finished_at: Utc::now(),
                        input: input.clone(),
                        output: None,
                        error: Some(error),
                    });

                    if attempt < max_retries {
                        attempt += 1;
                        if delay > 0 {
                            tokio::time::sleep(Duration::from_secs(delay)).await;
                        }
                        continue;
                    }

                    if let Some(fallback) =
                        node.retry.as_ref().and_then(|r| r.fallback_value.clone())
                    {
                        info!(node_id = %node.id, "retries exhausted, using fallback value");
                        return self.complete_node(
                            definition,
                            instance,
                            node,
                            started_at,
                            input,
                            Some(fallback),
                        );
                    }

                    instance.fail();
                    return Step::Halt;
                }
            }
        }
    }

    /// Merges a completed node's output and picks the next edge.
    fn complete_node(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        node: &WorkflowNode,
        started_at: DateTime<Utc>,
        input: JsonValue,
        output: Option<JsonValue>,
    ) -> Step {
        let next_context = match &output {
            Some(value) => instance.context.merged(value),
            None => instance.context.clone(),
        };
        instance.log(ExecutionLogEntry {
            node_id: node.id,
            status: LogStatus::Completed,
            started_at,
            finished_at: Utc::now(),
            input,
            output: Some(next_context.to_value()),
            error: None,
        });
        instance.context = next_context;
        self.advance(definition, instance, node)
    }

    /// Picks the next node after a non-condition node completes.
    ///
    /// The first declared edge whose guard passes wins; timeout-labeled
    /// edges are reserved for the escalation path. A node with no outgoing
    /// edges exhausts the graph and completes the instance.
    fn advance(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        node: &WorkflowNode,
    ) -> Step {
        let candidates: Vec<&WorkflowEdge> = definition
            .outgoing(node.id)
            .into_iter()
            .filter(|e| e.label.as_deref() != Some(TIMEOUT_LABEL))
            .collect();

        if candidates.is_empty() {
            info!(instance_id = %instance.id, node_id = %node.id, "graph exhausted, instance completed");
            instance.complete();
            return Step::Halt;
        }

        for edge in candidates {
            let guard_passes = edge
                .conditions
                .as_ref()
                .is_none_or(|conditions| evaluate_all(conditions, &instance.context));
            if guard_passes {
                return Step::Next(edge.target);
            }
        }

        self.fail_fatal(
            instance,
            node.id,
            "no outgoing edge matched and no default edge is defined",
        );
        Step::Halt
    }

    /// Records a fatal workflow error and fails the instance.
    fn fail_fatal(
        &self,
        instance: &mut WorkflowInstance,
        node_id: NodeId,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(instance_id = %instance.id, %node_id, %message, "fatal workflow error");
        instance.record_error(node_id, message, 0);
        instance.current_node_id = Some(node_id);
        instance.fail();
    }
}
