//! Error taxonomy for the workflow core.
//!
//! Validation failures are returned synchronously to the caller and never
//! retried here; infrastructure failures are retried with backoff at the
//! transaction boundary only (see `store::retry`). Every variant carries
//! enough structured detail for a UI to explain the rejection without
//! another round-trip.

use thiserror::Error;

use crate::model::{DocumentId, Role, StateCode};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("document {document_id} not found or its workflow is terminal")]
    NotFound { document_id: DocumentId },

    #[error("version conflict on {document_id}: expected {expected}, stored {actual}")]
    ConcurrencyConflict {
        document_id: DocumentId,
        expected: u64,
        actual: u64,
    },

    #[error("no {from} -> {to} edge in workflow type {workflow_type}")]
    InvalidTransition {
        document_id: DocumentId,
        workflow_type: String,
        from: StateCode,
        to: StateCode,
    },

    #[error(
        "role {asserted_role} may not perform {from} -> {to} (requires one of {required_roles:?})"
    )]
    UnauthorizedActor {
        document_id: DocumentId,
        from: StateCode,
        to: StateCode,
        asserted_role: Role,
        required_roles: Vec<Role>,
    },

    #[error("precondition failed for {from} -> {to} on {document_id}: {rule}")]
    PreconditionFailed {
        document_id: DocumentId,
        from: StateCode,
        to: StateCode,
        rule: String,
    },

    #[error("document {document_id} already has an active workflow ({workflow_type})")]
    WorkflowAlreadyActive {
        document_id: DocumentId,
        workflow_type: String,
    },

    #[error("audit ledger append failed for {document_id}: {reason}")]
    AuditWriteFailure {
        document_id: DocumentId,
        reason: String,
    },

    #[error("audit chain for {document_id} is broken at entry {broken_at}; transitions refused")]
    AuditIntegrity {
        document_id: DocumentId,
        broken_at: u64,
    },

    #[error("unknown workflow type: {workflow_type}")]
    UnknownWorkflowType { workflow_type: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    /// Whether the caller may usefully retry after re-reading the document.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::ConcurrencyConflict { .. })
    }
}

/// Failures surfaced by the transactional store. `VersionConflict` and
/// `ChainBroken` are mapped to their `WorkflowError` counterparts by the
/// executor; the rest are infrastructure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document {document_id} not found")]
    DocumentMissing { document_id: DocumentId },

    #[error("document {document_id} already exists")]
    DocumentExists { document_id: DocumentId },

    #[error("document {document_id} already has an active workflow ({workflow_type})")]
    WorkflowActive {
        document_id: DocumentId,
        workflow_type: String,
    },

    #[error("version conflict on {document_id}: expected {expected}, stored {actual}")]
    VersionConflict {
        document_id: DocumentId,
        expected: u64,
        actual: u64,
    },

    #[error("ledger chain for {document_id} broken at entry {broken_at}")]
    ChainBroken {
        document_id: DocumentId,
        broken_at: u64,
    },

    #[error("ledger append rejected for {document_id}: {reason}")]
    LedgerAppend {
        document_id: DocumentId,
        reason: String,
    },

    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Infrastructure faults worth retrying with backoff; logical conflicts
    /// are not (the caller must re-read first).
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable { .. } => true,
            #[cfg(feature = "database")]
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
