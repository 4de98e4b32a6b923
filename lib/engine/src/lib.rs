//! Workflow execution engine for the cargolink platform.
//!
//! This crate provides the freight-ops workflow engine, including:
//!
//! - **Graph Model**: Versioned workflow definitions with typed nodes,
//!   labeled edges, and condition-guarded routing
//! - **Execution Context**: Immutable JSON snapshots merged additively on
//!   every transition
//! - **Handlers**: A registry of pluggable node handlers with a
//!   three-outcome contract (completed, suspended, failed)
//! - **Dispatcher**: The interpreter loop that advances instances through
//!   the graph, applying node-local retry policies
//! - **Instance Manager**: Lifecycle operations (start, resume, pause,
//!   cancel, timeout) serialized per instance
//! - **Manual Entry**: Form-backed human input that suspends and resumes
//!   instances

pub mod condition;
pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod instance;
pub mod manager;
pub mod manual_entry;
pub mod node;
pub mod schema;
pub mod store;
pub mod template;

pub use condition::{Condition, ConditionLogic, ConditionOperator, evaluate_all};
pub use context::ExecutionContext;
pub use definition::{
    DefinitionStatus, SlaConfig, TriggerSpec, WorkflowDefinition, WorkflowEdge,
};
pub use dispatcher::{Dispatcher, TIMEOUT_LABEL};
pub use error::{DefinitionError, EngineError, StoreError};
pub use handler::{ExternalServiceError, HandlerOutcome, HandlerRegistry, NodeHandler};
pub use instance::{
    EntityBinding, EntityType, ExecutionLogEntry, InstanceStatus, LogStatus, WorkflowInstance,
};
pub use manager::{DeadlineSink, InstanceManager};
pub use manual_entry::{
    EntryStatus, InMemoryManualEntryStore, ManualEntryRecord, ManualEntryService,
    ManualEntryStore,
};
pub use node::{
    DeadlinePolicy, NodeConfig, NodeId, NodeKind, RetryPolicy, WorkflowNode,
};
pub use schema::{FieldType, FormField, FormSchema};
pub use store::{
    DefinitionStore, InMemoryDefinitionStore, InMemoryInstanceStore, InstanceStore,
};
