// Docwarden - controlled-document workflow engine with a tamper-evident
// audit trail. This exposes the core components for testing and integration.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod instance;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod roles;
pub mod shutdown;
pub mod store;
pub mod sweep;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use cache::StateCache;
pub use config::{config, init_config, DocwardenConfig};
pub use error::{StorageError, WorkflowError};
pub use executor::{TransitionApplied, TransitionExecutor, TransitionRequest};
pub use instance::{NewDocument, WorkflowInstanceManager};
pub use ledger::{AuditLedger, AuditLedgerEntry, ChainStatus, LedgerPayload};
pub use model::{
    Actor, ActorId, Document, DocumentId, DocumentSnapshot, DocumentTransition, DocumentWorkflow,
    Role, StateCategory, StateCode, TransitionOutcome,
};
pub use notify::{NotificationEvent, NotificationKind, NotificationSink};
pub use roles::{RoleResolver, StaticRoleResolver};
pub use shutdown::ShutdownCoordinator;
pub use store::{MemoryStore, RetryPolicy, TransitionCommit, WorkflowStore};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use sweep::{SweepReport, Sweeper};
pub use telemetry::{
    create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
pub use workflow::{
    workflow_types, DisplayNames, StateGraph, StateGraphRegistry, TransitionEdge,
    TransitionTrigger,
};
