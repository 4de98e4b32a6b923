//! Document request handler.

use crate::context::ExecutionContext;
use crate::error::StoreError;
use crate::handler::{HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, NodeId, WorkflowNode};
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Lifecycle of a requested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Requested, nothing uploaded yet.
    Requested,
    /// Uploaded, pending review.
    Uploaded,
    /// Reviewed and accepted.
    Approved,
    /// Reviewed and rejected.
    Rejected,
}

/// A per-(instance, node) document request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// The owning instance.
    pub instance_id: WorkflowInstanceId,
    /// The document-request node within that instance.
    pub node_id: NodeId,
    /// Document type tag (e.g. "bill_of_lading").
    pub document_type: String,
    /// Request status.
    pub status: DocumentStatus,
    /// Storage URL, once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Creates a fresh request.
    #[must_use]
    pub fn new(
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            document_type: document_type.into(),
            status: DocumentStatus::Requested,
            url: None,
            created_at: Utc::now(),
        }
    }
}

/// Seam to document storage and review.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Finds the request for an (instance, node) pair.
    async fn find_for_node(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Records a request.
    async fn insert(&self, record: DocumentRecord) -> Result<(), StoreError>;
}

/// In-memory document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    records: RwLock<HashMap<(WorkflowInstanceId, NodeId), DocumentRecord>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a request to a new status (review happens outside the engine).
    pub async fn set_status(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
        status: DocumentStatus,
        url: Option<String>,
    ) {
        if let Some(record) = self.records.write().await.get_mut(&(instance_id, node_id)) {
            record.status = status;
            record.url = url;
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_for_node(
        &self,
        instance_id: WorkflowInstanceId,
        node_id: NodeId,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(instance_id, node_id))
            .cloned())
    }

    async fn insert(&self, record: DocumentRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert((record.instance_id, record.node_id), record);
        Ok(())
    }
}

/// Suspends the instance until the requested document is approved.
///
/// Re-entry is idempotent: the existing request is inspected rather than
/// re-created. A rejected document fails the node so the retry policy (or
/// a timeout edge) decides what happens next.
pub struct DocumentRequestHandler {
    store: Arc<dyn DocumentStore>,
}

impl DocumentRequestHandler {
    /// Creates the handler over a document store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NodeHandler for DocumentRequestHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        instance_id: WorkflowInstanceId,
        _context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::DocumentRequest { document_type } = &node.config else {
            return HandlerOutcome::failed(format!(
                "node {} is not a document_request node",
                node.id
            ));
        };

        let existing = match self.store.find_for_node(instance_id, node.id).await {
            Ok(existing) => existing,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };

        match existing {
            Some(record) => match record.status {
                DocumentStatus::Approved => {
                    let mut documents = serde_json::Map::new();
                    documents.insert(record.document_type, json!({ "url": record.url }));
                    HandlerOutcome::completed_with(json!({ "documents": documents }))
                }
                DocumentStatus::Rejected => HandlerOutcome::failed(format!(
                    "document '{}' was rejected in review",
                    record.document_type
                )),
                DocumentStatus::Requested | DocumentStatus::Uploaded => {
                    HandlerOutcome::suspended(format!(
                        "waiting for document '{}'",
                        record.document_type
                    ))
                }
            },
            None => {
                let record = DocumentRecord::new(instance_id, node.id, document_type.clone());
                info!(%instance_id, node_id = %node.id, %document_type, "document requested");
                if let Err(e) = self.store.insert(record).await {
                    return HandlerOutcome::failed(e.to_string());
                }
                HandlerOutcome::suspended(format!("waiting for document '{document_type}'"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_node() -> WorkflowNode {
        WorkflowNode::new(
            "Bill of lading",
            NodeConfig::DocumentRequest {
                document_type: "bill_of_lading".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn request_then_approval_completes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let handler = DocumentRequestHandler::new(store.clone());
        let node = request_node();
        let instance_id = WorkflowInstanceId::new();

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        assert!(matches!(outcome, HandlerOutcome::Suspended { .. }));

        store
            .set_status(
                instance_id,
                node.id,
                DocumentStatus::Approved,
                Some("s3://docs/bol-42.pdf".to_string()),
            )
            .await;

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        let HandlerOutcome::Completed {
            output: Some(output),
        } = outcome
        else {
            panic!("expected completion");
        };
        assert_eq!(
            output["documents"]["bill_of_lading"]["url"],
            json!("s3://docs/bol-42.pdf")
        );
    }

    #[tokio::test]
    async fn uploaded_but_unreviewed_stays_suspended() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let handler = DocumentRequestHandler::new(store.clone());
        let node = request_node();
        let instance_id = WorkflowInstanceId::new();

        handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        store
            .set_status(instance_id, node.id, DocumentStatus::Uploaded, None)
            .await;

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        assert!(matches!(outcome, HandlerOutcome::Suspended { .. }));
    }

    #[tokio::test]
    async fn rejected_document_fails_the_node() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let handler = DocumentRequestHandler::new(store.clone());
        let node = request_node();
        let instance_id = WorkflowInstanceId::new();

        handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        store
            .set_status(instance_id, node.id, DocumentStatus::Rejected, None)
            .await;

        let outcome = handler
            .execute(&node, instance_id, &ExecutionContext::new())
            .await;
        assert!(matches!(outcome, HandlerOutcome::Failed { .. }));
    }
}
