//! CRM lookup and update handlers.

use crate::context::ExecutionContext;
use crate::handler::{ExternalServiceError, HandlerOutcome, NodeHandler};
use crate::node::{NodeConfig, WorkflowNode};
use crate::template;
use async_trait::async_trait;
use cargolink_core::WorkflowInstanceId;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::debug;

/// Seam to the CRM system.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Looks up a record of `entity` by key.
    async fn lookup(
        &self,
        entity: &str,
        key: &str,
    ) -> Result<Option<JsonValue>, ExternalServiceError>;

    /// Updates a record of `entity` with the given field values.
    async fn update(
        &self,
        entity: &str,
        key: &str,
        fields: &JsonValue,
    ) -> Result<(), ExternalServiceError>;
}

/// Looks up a CRM record and merges it into the context under the
/// configured output key.
pub struct CrmLookupHandler {
    client: Arc<dyn CrmClient>,
}

impl CrmLookupHandler {
    /// Creates the handler over a CRM client.
    #[must_use]
    pub fn new(client: Arc<dyn CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for CrmLookupHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::CrmLookup {
            entity,
            key_template,
            output_key,
        } = &node.config
        else {
            return HandlerOutcome::failed(format!("node {} is not a crm_lookup node", node.id));
        };

        let key = template::resolve(key_template, context);
        debug!(%entity, %key, "crm lookup");
        match self.client.lookup(entity, &key).await {
            Ok(Some(record)) => {
                let mut output = serde_json::Map::new();
                output.insert(output_key.clone(), record);
                HandlerOutcome::completed_with(JsonValue::Object(output))
            }
            Ok(None) => {
                HandlerOutcome::failed(format!("no {entity} record in CRM for key '{key}'"))
            }
            Err(e) => e.into(),
        }
    }
}

/// Updates a CRM record with template-resolved field values.
pub struct CrmUpdateHandler {
    client: Arc<dyn CrmClient>,
}

impl CrmUpdateHandler {
    /// Creates the handler over a CRM client.
    #[must_use]
    pub fn new(client: Arc<dyn CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for CrmUpdateHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _instance_id: WorkflowInstanceId,
        context: &ExecutionContext,
    ) -> HandlerOutcome {
        let NodeConfig::CrmUpdate {
            entity,
            key_template,
            fields,
        } = &node.config
        else {
            return HandlerOutcome::failed(format!("node {} is not a crm_update node", node.id));
        };

        let key = template::resolve(key_template, context);
        let resolved = template::resolve_value(fields, context);
        debug!(%entity, %key, "crm update");
        match self.client.update(entity, &key, &resolved).await {
            Ok(()) => HandlerOutcome::completed(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// A CRM fake holding records keyed by (entity, key).
    #[derive(Default)]
    struct FakeCrm {
        records: Mutex<HashMap<(String, String), JsonValue>>,
        fail: bool,
    }

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn lookup(
            &self,
            entity: &str,
            key: &str,
        ) -> Result<Option<JsonValue>, ExternalServiceError> {
            if self.fail {
                return Err(ExternalServiceError::new("crm", "connection refused"));
            }
            Ok(self
                .records
                .lock()
                .await
                .get(&(entity.to_string(), key.to_string()))
                .cloned())
        }

        async fn update(
            &self,
            entity: &str,
            key: &str,
            fields: &JsonValue,
        ) -> Result<(), ExternalServiceError> {
            if self.fail {
                return Err(ExternalServiceError::new("crm", "connection refused"));
            }
            self.records
                .lock()
                .await
                .insert((entity.to_string(), key.to_string()), fields.clone());
            Ok(())
        }
    }

    fn lookup_node() -> WorkflowNode {
        WorkflowNode::new(
            "Fetch customer",
            NodeConfig::CrmLookup {
                entity: "customer".to_string(),
                key_template: "{{shipment.customer_id}}".to_string(),
                output_key: "customer".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn lookup_merges_record_under_output_key() {
        let crm = Arc::new(FakeCrm::default());
        crm.records.lock().await.insert(
            ("customer".to_string(), "CUST-7".to_string()),
            json!({ "name": "Acme Freight", "tier": "gold" }),
        );
        let handler = CrmLookupHandler::new(crm);
        let context =
            ExecutionContext::from_value(json!({ "shipment": { "customer_id": "CUST-7" } }));

        let outcome = handler
            .execute(&lookup_node(), WorkflowInstanceId::new(), &context)
            .await;
        assert_eq!(
            outcome,
            HandlerOutcome::completed_with(
                json!({ "customer": { "name": "Acme Freight", "tier": "gold" } })
            )
        );
    }

    #[tokio::test]
    async fn missing_record_fails_the_node() {
        let handler = CrmLookupHandler::new(Arc::new(FakeCrm::default()));
        let context =
            ExecutionContext::from_value(json!({ "shipment": { "customer_id": "CUST-404" } }));

        let outcome = handler
            .execute(&lookup_node(), WorkflowInstanceId::new(), &context)
            .await;
        assert!(matches!(outcome, HandlerOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn client_error_becomes_failed_outcome() {
        let handler = CrmLookupHandler::new(Arc::new(FakeCrm {
            fail: true,
            ..FakeCrm::default()
        }));

        let outcome = handler
            .execute(
                &lookup_node(),
                WorkflowInstanceId::new(),
                &ExecutionContext::new(),
            )
            .await;
        let HandlerOutcome::Failed { error } = outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.contains("crm"));
    }

    #[tokio::test]
    async fn update_resolves_templated_fields() {
        let crm = Arc::new(FakeCrm::default());
        let handler = CrmUpdateHandler::new(crm.clone());
        let node = WorkflowNode::new(
            "Record quote",
            NodeConfig::CrmUpdate {
                entity: "shipment".to_string(),
                key_template: "{{shipment.ref}}".to_string(),
                fields: json!({ "status": "quoted", "quote_total": "{{quote.total}}" }),
            },
        );
        let context = ExecutionContext::from_value(json!({
            "shipment": { "ref": "SHP-42" },
            "quote": { "total": 1250.5 },
        }));

        let outcome = handler
            .execute(&node, WorkflowInstanceId::new(), &context)
            .await;
        assert_eq!(outcome, HandlerOutcome::completed());

        let stored = crm
            .records
            .lock()
            .await
            .get(&("shipment".to_string(), "SHP-42".to_string()))
            .cloned()
            .expect("record written");
        assert_eq!(stored["quote_total"], json!("1250.5"));
    }
}
