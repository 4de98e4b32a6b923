//! Workflow node types and configurations.
//!
//! Nodes are the typed steps of a workflow graph. Each node carries:
//! - A unique ID within the definition
//! - A kind-specific configuration payload
//! - An optional retry policy (applies to handler failures on this node only)
//! - An optional deadline policy (for wait-capable nodes)

use crate::condition::Condition;
use crate::schema::FormSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// A unique identifier for a node within a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The closed set of node type tags.
///
/// The dispatcher interprets `Start`, `End`, and `Condition` itself; every
/// other kind is dispatched through the handler registry. Adding a node kind
/// means adding a tag here and registering a handler for it, never touching
/// the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Condition,
    ManualEntry,
    CrmLookup,
    CrmUpdate,
    KycCheck,
    DocumentRequest,
    AiEmailDraft,
    AiNextStep,
    SchemaValidation,
    Notify,
    Action,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Condition => "condition",
            Self::ManualEntry => "manual_entry",
            Self::CrmLookup => "crm_lookup",
            Self::CrmUpdate => "crm_update",
            Self::KycCheck => "kyc_check",
            Self::DocumentRequest => "document_request",
            Self::AiEmailDraft => "ai_email_draft",
            Self::AiNextStep => "ai_next_step",
            Self::SchemaValidation => "schema_validation",
            Self::Notify => "notify",
            Self::Action => "action",
        };
        f.write_str(tag)
    }
}

/// Configuration for a node, varying by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Entry point of the graph. Exactly one per definition.
    Start,
    /// Terminal node; reaching it completes the instance.
    End,
    /// Boolean branch over the execution context.
    Condition {
        /// Predicates combined per their `logic` connectives.
        conditions: Vec<Condition>,
    },
    /// Wait for a human to fill a form.
    ManualEntry {
        /// Schema the submitted data must conform to.
        form_schema: FormSchema,
    },
    /// Look up a record in the CRM and merge it into context.
    CrmLookup {
        /// CRM entity name (e.g. "customer", "shipment").
        entity: String,
        /// Template for the lookup key, resolved against context.
        key_template: String,
        /// Context key the looked-up record is stored under.
        output_key: String,
    },
    /// Update a CRM record with template-resolved field values.
    CrmUpdate {
        /// CRM entity name.
        entity: String,
        /// Template for the record key.
        key_template: String,
        /// Field values; string templates resolve against context.
        fields: JsonValue,
    },
    /// Run a KYC check against a subject taken from context.
    KycCheck {
        /// Dotted context path to the subject record.
        subject_path: String,
    },
    /// Wait for a document to be uploaded and approved.
    DocumentRequest {
        /// Document type tag (e.g. "bill_of_lading").
        document_type: String,
    },
    /// Draft an outbound email and submit it as an AI suggestion.
    AiEmailDraft {
        /// Drafting instructions; templates resolve against context.
        prompt: String,
    },
    /// Suggest the next process step and submit it as an AI suggestion.
    AiNextStep {
        /// Recommendation instructions; templates resolve against context.
        prompt: String,
    },
    /// Validate a context value against a form schema.
    SchemaValidation {
        /// Dotted context path to the value under validation.
        target_path: String,
        /// Schema to validate against.
        schema: FormSchema,
    },
    /// Send a notification over a messaging channel.
    Notify {
        /// Channel tag (e.g. "email", "whatsapp").
        channel: String,
        /// Recipient template, resolved against context.
        recipient: String,
        /// Message body template, resolved against context.
        message: String,
    },
    /// Generic named operation performed by an external collaborator.
    Action {
        /// Operation name understood by the action client.
        operation: String,
        /// Operation parameters; string templates resolve against context.
        params: JsonValue,
    },
}

impl NodeConfig {
    /// Returns the kind tag of this configuration.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Start => NodeKind::Start,
            Self::End => NodeKind::End,
            Self::Condition { .. } => NodeKind::Condition,
            Self::ManualEntry { .. } => NodeKind::ManualEntry,
            Self::CrmLookup { .. } => NodeKind::CrmLookup,
            Self::CrmUpdate { .. } => NodeKind::CrmUpdate,
            Self::KycCheck { .. } => NodeKind::KycCheck,
            Self::DocumentRequest { .. } => NodeKind::DocumentRequest,
            Self::AiEmailDraft { .. } => NodeKind::AiEmailDraft,
            Self::AiNextStep { .. } => NodeKind::AiNextStep,
            Self::SchemaValidation { .. } => NodeKind::SchemaValidation,
            Self::Notify { .. } => NodeKind::Notify,
            Self::Action { .. } => NodeKind::Action,
        }
    }
}

/// Retry policy for handler failures on a single node.
///
/// Retries are node-local: nothing is retried at the instance level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of re-invocations after the initial attempt.
    pub retries: u32,
    /// Delay between attempts, in seconds.
    #[serde(default)]
    pub retry_delay_seconds: u64,
    /// Value merged into context instead of failing the instance once
    /// retries are exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<JsonValue>,
}

impl RetryPolicy {
    /// A policy with the given retry count and no delay or fallback.
    #[must_use]
    pub fn times(retries: u32) -> Self {
        Self {
            retries,
            retry_delay_seconds: 0,
            fallback_value: None,
        }
    }

    /// Sets a fallback value.
    #[must_use]
    pub fn with_fallback(mut self, value: JsonValue) -> Self {
        self.fallback_value = Some(value);
        self
    }
}

/// Deadline policy for wait-capable nodes.
///
/// The escalation service sweeps suspended nodes against these deadlines;
/// latency is bounded by the sweep interval, not instantaneous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlinePolicy {
    /// Minutes after suspension before the node times out.
    pub timeout_minutes: Option<u32>,
    /// Hours between reminder notifications while suspended.
    pub reminder_after_hours: Option<u32>,
    /// Role the timeout escalates to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the definition.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Kind-specific configuration.
    pub config: NodeConfig,
    /// Node-local retry policy for handler failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Deadline policy for wait-capable nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DeadlinePolicy>,
}

impl WorkflowNode {
    /// Creates a node with a fresh ID.
    #[must_use]
    pub fn new(name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            config,
            retry: None,
            deadline: None,
        }
    }

    /// Creates a node with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            retry: None,
            deadline: None,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the deadline policy.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DeadlinePolicy) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the kind tag of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionOperator;
    use serde_json::json;

    #[test]
    fn node_id_display() {
        let id = NodeId::new();
        assert!(id.to_string().starts_with("node_"));
    }

    #[test]
    fn config_kind_mapping() {
        assert_eq!(NodeConfig::Start.kind(), NodeKind::Start);
        let condition = NodeConfig::Condition {
            conditions: vec![Condition::new(
                "quote.total",
                ConditionOperator::LessThan,
                json!(5000),
            )],
        };
        assert_eq!(condition.kind(), NodeKind::Condition);
    }

    #[test]
    fn kind_display_tags() {
        assert_eq!(NodeKind::AiEmailDraft.to_string(), "ai_email_draft");
        assert_eq!(NodeKind::ManualEntry.to_string(), "manual_entry");
    }

    #[test]
    fn retry_policy_builder() {
        let policy = RetryPolicy::times(2).with_fallback(json!({ "kyc": "unverified" }));
        assert_eq!(policy.retries, 2);
        assert!(policy.fallback_value.is_some());
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = WorkflowNode::new(
            "Request booking form",
            NodeConfig::ManualEntry {
                form_schema: FormSchema::default(),
            },
        )
        .with_deadline(DeadlinePolicy {
            timeout_minutes: Some(60),
            reminder_after_hours: Some(4),
            escalate_to: Some("ops_manager".to_string()),
        });

        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: WorkflowNode = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }
}
