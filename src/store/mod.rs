//! Transactional storage seam for documents, workflow instances, transition
//! history and the audit chain.
//!
//! `commit_transition` is the one write path for lifecycle state: it applies
//! the version increment, the state change, the transition record and the
//! ledger append as a single atomic unit, or nothing at all. The in-memory
//! store is the default; the SQLite store behind the `database` feature
//! persists the same shape and enforces append-only at the storage engine
//! level.

pub mod memory;
pub mod retry;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::ledger::chain::{AuditLedgerEntry, LedgerPayload};
use crate::model::{
    Document, DocumentId, DocumentSnapshot, DocumentTransition, DocumentWorkflow, StateCode,
};

pub use memory::MemoryStore;
pub use retry::{with_backoff, RetryPolicy};
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

/// Everything `commit_transition` applies atomically.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub document_id: DocumentId,
    /// Concurrency token the caller read; the commit fails with
    /// `VersionConflict` if the stored value moved on.
    pub expected_version: u64,
    pub to_state: StateCode,
    pub transition: DocumentTransition,
    /// Lifecycle dates carried by the transition request, applied together
    /// with the state change.
    pub effective_date: Option<DateTime<Utc>>,
    pub obsolescence_date: Option<DateTime<Utc>>,
    pub obsolescence_reason: Option<String>,
    /// Due timestamp for the new step, from the graph's timeout window.
    pub due_at: Option<DateTime<Utc>>,
    /// True when the destination state ends the workflow instance.
    pub completes_workflow: bool,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a new document with its workflow instance and the genesis
    /// ledger entry, atomically.
    async fn create_document(
        &self,
        document: Document,
        workflow: DocumentWorkflow,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError>;

    /// Bind a fresh workflow instance to an existing document whose previous
    /// instance has completed, appending its genesis ledger entry to the
    /// document's chain. Fails with `WorkflowActive` while an instance is
    /// still running.
    async fn start_workflow(
        &self,
        id: &DocumentId,
        workflow: DocumentWorkflow,
        initial_state: StateCode,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError>;

    async fn snapshot(&self, id: &DocumentId) -> Result<Option<DocumentSnapshot>, StorageError>;

    /// Atomically apply a validated transition. Verifies the audit chain and
    /// the version token under the same lock/transaction as the write; on
    /// any failure nothing is persisted.
    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<DocumentSnapshot, StorageError>;

    /// Ordered transition history, optionally bounded by `[start, end)`.
    async fn transitions(
        &self,
        id: &DocumentId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<DocumentTransition>, StorageError>;

    /// Audit chain entries for a document, oldest first.
    async fn ledger_entries(&self, id: &DocumentId)
        -> Result<Vec<AuditLedgerEntry>, StorageError>;

    /// Documents whose workflow is active and whose current state is one of
    /// `states`.
    async fn documents_in_states(
        &self,
        states: &[StateCode],
    ) -> Result<Vec<DocumentSnapshot>, StorageError>;

    /// Active workflows whose due timestamp has passed and which have not
    /// been escalated since entering the current step.
    async fn overdue_workflows(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentSnapshot>, StorageError>;

    /// Mark an overdue step as escalated so redundant sweeps stay quiet.
    async fn record_escalation(
        &self,
        id: &DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn all_documents(&self) -> Result<Vec<DocumentSnapshot>, StorageError>;
}
