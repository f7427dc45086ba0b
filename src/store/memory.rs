//! In-memory transactional store.
//!
//! The whole map sits behind one async mutex, which serializes commits and
//! keeps "previous ledger entry" unambiguous without further coordination.
//! Suitable for tests and single-process deployments; the SQLite store
//! covers everything that needs to survive a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::ledger::chain::{self, AuditLedgerEntry, ChainStatus, LedgerPayload};
use crate::model::{
    Document, DocumentId, DocumentSnapshot, DocumentTransition, DocumentWorkflow, StateCode,
};
use crate::store::{TransitionCommit, WorkflowStore};

#[derive(Debug, Clone)]
struct DocumentRecord {
    document: Document,
    workflow: DocumentWorkflow,
    transitions: Vec<DocumentTransition>,
    ledger: Vec<AuditLedgerEntry>,
}

impl DocumentRecord {
    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            document: self.document.clone(),
            workflow: self.workflow.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<DocumentId, DocumentRecord>>,
    /// Test hook: makes the next ledger append fail so callers can verify
    /// that a failed audit write rolls the whole transition back.
    fail_next_ledger_append: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for the next ledger append to fail. Nothing in production
    /// code calls this; integration tests use it to exercise the
    /// audit-write-failure path.
    pub fn inject_ledger_failure(&self) {
        self.fail_next_ledger_append.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create_document(
        &self,
        document: Document,
        workflow: DocumentWorkflow,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&document.id) {
            return Err(StorageError::DocumentExists {
                document_id: document.id.clone(),
            });
        }
        let entry = chain::seal_entry(&document.id, 0, None, &genesis, Utc::now());
        let record = DocumentRecord {
            document: document.clone(),
            workflow,
            transitions: Vec::new(),
            ledger: vec![entry],
        };
        let snapshot = record.snapshot();
        records.insert(document.id, record);
        Ok(snapshot)
    }

    async fn start_workflow(
        &self,
        id: &DocumentId,
        workflow: DocumentWorkflow,
        initial_state: StateCode,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: id.clone(),
            })?;
        if !record.workflow.is_terminal() {
            return Err(StorageError::WorkflowActive {
                document_id: id.clone(),
                workflow_type: record.workflow.workflow_type.clone(),
            });
        }
        if let ChainStatus::BrokenAt(index) = chain::verify_entries(&record.ledger) {
            return Err(StorageError::ChainBroken {
                document_id: id.clone(),
                broken_at: index,
            });
        }

        let seq = record.ledger.len() as u64;
        let prev = record.ledger.last().map(|e| e.entry_hash.as_str());
        let entry = chain::seal_entry(id, seq, prev, &genesis, Utc::now());

        record.document.workflow_type = workflow.workflow_type.clone();
        record.document.current_state = initial_state;
        record.document.updated_at = workflow.started_at;
        record.workflow = workflow;
        record.ledger.push(entry);

        Ok(record.snapshot())
    }

    async fn snapshot(&self, id: &DocumentId) -> Result<Option<DocumentSnapshot>, StorageError> {
        let records = self.records.lock().await;
        Ok(records.get(id).map(DocumentRecord::snapshot))
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<DocumentSnapshot, StorageError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&commit.document_id)
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: commit.document_id.clone(),
            })?;

        // Fail closed: a broken chain refuses every new transition until it
        // is remediated.
        if let ChainStatus::BrokenAt(index) = chain::verify_entries(&record.ledger) {
            return Err(StorageError::ChainBroken {
                document_id: commit.document_id.clone(),
                broken_at: index,
            });
        }

        if record.document.version != commit.expected_version {
            return Err(StorageError::VersionConflict {
                document_id: commit.document_id.clone(),
                expected: commit.expected_version,
                actual: record.document.version,
            });
        }

        if self.fail_next_ledger_append.swap(false, Ordering::SeqCst) {
            return Err(StorageError::LedgerAppend {
                document_id: commit.document_id.clone(),
                reason: "injected ledger failure".to_string(),
            });
        }

        let payload = LedgerPayload::from_transition(&commit.transition);
        let seq = record.ledger.len() as u64;
        let prev = record.ledger.last().map(|e| e.entry_hash.as_str());
        let entry = chain::seal_entry(&commit.document_id, seq, prev, &payload, Utc::now());

        // Past this point every mutation applies; the lock makes the whole
        // block atomic with respect to other callers.
        let doc = &mut record.document;
        doc.version += 1;
        doc.current_state = commit.to_state.clone();
        doc.updated_at = commit.transition.timestamp;
        if let Some(date) = commit.effective_date {
            doc.effective_date = Some(date);
        }
        if let Some(date) = commit.obsolescence_date {
            doc.obsolescence_date = Some(date);
        }
        if let Some(reason) = commit.obsolescence_reason.clone() {
            doc.obsolescence_reason = Some(reason);
        }

        record.workflow.due_at = commit.due_at;
        record.workflow.escalated_at = None;
        if commit.completes_workflow {
            record.workflow.completed_at = Some(commit.transition.timestamp);
        }

        record.transitions.push(commit.transition);
        record.ledger.push(entry);

        Ok(record.snapshot())
    }

    async fn transitions(
        &self,
        id: &DocumentId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<DocumentTransition>, StorageError> {
        let records = self.records.lock().await;
        let record = records.get(id).ok_or_else(|| StorageError::DocumentMissing {
            document_id: id.clone(),
        })?;
        let transitions = match range {
            Some((start, end)) => record
                .transitions
                .iter()
                .filter(|t| t.timestamp >= start && t.timestamp < end)
                .cloned()
                .collect(),
            None => record.transitions.clone(),
        };
        Ok(transitions)
    }

    async fn ledger_entries(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<AuditLedgerEntry>, StorageError> {
        let records = self.records.lock().await;
        let record = records.get(id).ok_or_else(|| StorageError::DocumentMissing {
            document_id: id.clone(),
        })?;
        Ok(record.ledger.clone())
    }

    async fn documents_in_states(
        &self,
        states: &[StateCode],
    ) -> Result<Vec<DocumentSnapshot>, StorageError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| !r.workflow.is_terminal() && states.contains(&r.document.current_state))
            .map(DocumentRecord::snapshot)
            .collect())
    }

    async fn overdue_workflows(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentSnapshot>, StorageError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| {
                !r.workflow.is_terminal()
                    && r.workflow.due_at.is_some_and(|due| due <= now)
                    && r.workflow.escalated_at.is_none()
            })
            .map(DocumentRecord::snapshot)
            .collect())
    }

    async fn record_escalation(
        &self,
        id: &DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: id.clone(),
            })?;
        record.workflow.escalated_at = Some(at);
        Ok(())
    }

    async fn all_documents(&self) -> Result<Vec<DocumentSnapshot>, StorageError> {
        let records = self.records.lock().await;
        Ok(records.values().map(DocumentRecord::snapshot).collect())
    }
}
