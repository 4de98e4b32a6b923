//! Handler for manual data-entry nodes.

use crate::context::ExecutionContext;
use crate::handler::{HandlerOutcome, NodeHandler};
use crate::manual_entry::{EntryStatus, ManualEntryRecord, ManualEntryStore};
use crate::node::{NodeConfig, WorkflowNode};
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Suspends the instance until a human submits the node's form.
///
/// Re-entry is idempotent through the entry store: at most one record exists
/// per (instance, node) pair. A completed record short-circuits to the
/// submitted data; a pending one keeps the instance suspended without
/// creating a duplicate.
pub struct ManualEntryHandler {
    store: Arc<dyn ManualEntryStore>,
}

impl ManualEntryHandler {
    /// Creates the handler over an entry store.
    #[must_use]
    pub fn new(store: Arc<dyn ManualEntryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NodeHandler for ManualEntryHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        instance_id: WorkflowInstanceId,
        _context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::ManualEntry { form_schema } = &node.config else {
            return HandlerOutcome::failed(format!(
                "node {} is not a manual_entry node",
                node.id
            ));
        };

        let existing = match self.store.find_for_node(instance_id, node.id).await {
            Ok(existing) => existing,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };

        match existing {
            Some(record) if record.status == EntryStatus::Completed => {
                HandlerOutcome::completed_with(json!({
                    "manual_entry": record.submitted_data,
                }))
            }
            Some(_) => HandlerOutcome::suspended("waiting for manual entry"),
            None => {
                let record =
                    ManualEntryRecord::new(instance_id, node.id, form_schema.clone());
                info!(entry_id = %record.id, %instance_id, node_id = %node.id, "manual entry requested");
                if let Err(e) = self.store.insert(record).await {
                    return HandlerOutcome::failed(e.to_string());
                }
                HandlerOutcome::suspended("waiting for manual entry")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual_entry::InMemoryManualEntryStore;
    use crate::schema::{FieldType, FormField, FormSchema};
    use cargolink_core::UserId;
    use chrono::Utc;

    fn entry_node() -> WorkflowNode {
        WorkflowNode::new(
            "Booking details",
            NodeConfig::ManualEntry {
                form_schema: FormSchema::new(vec![FormField::required(
                    "incoterm",
                    FieldType::String,
                )]),
            },
        )
    }

    #[tokio::test]
    async fn first_execution_creates_record_and_suspends() {
        let store = Arc::new(InMemoryManualEntryStore::new());
        let handler = ManualEntryHandler::new(store.clone());
        let node = entry_node();
        let instance_id = WorkflowInstanceId::new();

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        assert!(matches!(outcome, HandlerOutcome::Suspended { .. }));

        let record = store
            .find_for_node(instance_id, node.id)
            .await
            .unwrap()
            .expect("record created");
        assert_eq!(record.status, EntryStatus::Pending);
    }

    #[tokio::test]
    async fn re_entry_does_not_duplicate_the_record() {
        let store = Arc::new(InMemoryManualEntryStore::new());
        let handler = ManualEntryHandler::new(store.clone());
        let node = entry_node();
        let instance_id = WorkflowInstanceId::new();

        handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;

        let record = store
            .find_for_node(instance_id, node.id)
            .await
            .unwrap()
            .expect("single record");
        // A second pending record would have shadowed the first ID.
        let again = store.get(record.id).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn completed_record_yields_submitted_data() {
        let store = Arc::new(InMemoryManualEntryStore::new());
        let handler = ManualEntryHandler::new(store.clone());
        let node = entry_node();
        let instance_id = WorkflowInstanceId::new();

        let mut record = ManualEntryRecord::new(
            instance_id,
            node.id,
            FormSchema::default(),
        );
        record.status = EntryStatus::Completed;
        record.submitted_data = Some(json!({ "incoterm": "FOB" }));
        record.submitted_by = Some(UserId::new());
        record.updated_at = Utc::now();
        store.insert(record).await.unwrap();

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        let HandlerOutcome::Completed {
            output: Some(output),
        } = outcome
        else {
            panic!("expected completion with output");
        };
        assert_eq!(output, json!({ "manual_entry": { "incoterm": "FOB" } }));
    }
}
