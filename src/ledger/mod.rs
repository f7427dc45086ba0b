//! Append-only, hash-chained audit ledger.
//!
//! Every applied transition (and administrative workflow event) becomes one
//! ledger entry. Each entry stores the SHA-256 digest of its payload and the
//! hash of the immediately preceding entry for the same document, so both
//! content and insertion order are tamper-evident. Entries are created only
//! through [`chain::seal_entry`]; no other component writes ledger rows.
//!
//! Chains are per document. Appends are serialized by the store's commit
//! path, which is what makes "previous entry" unambiguous under concurrent
//! transitions.

pub mod chain;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::WorkflowError;
use crate::model::{DocumentId, DocumentTransition};
use crate::store::WorkflowStore;

pub use chain::{AuditLedgerEntry, ChainStatus, LedgerPayload};

/// Read-side audit surface consumed by reporting: ordered history and chain
/// verification. Writes happen inside the store's transactional commit.
pub struct AuditLedger {
    store: Arc<dyn WorkflowStore>,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Recompute the whole chain for a document from entry zero.
    pub async fn verify_chain(&self, document_id: &DocumentId) -> Result<ChainStatus, WorkflowError> {
        let entries = self.store.ledger_entries(document_id).await?;
        Ok(chain::verify_entries(&entries))
    }

    /// Ordered transition history, optionally bounded to a date range
    /// (inclusive start, exclusive end).
    pub async fn list_transitions(
        &self,
        document_id: &DocumentId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<DocumentTransition>, WorkflowError> {
        let transitions = self.store.transitions(document_id, range).await?;
        Ok(transitions)
    }

    /// Raw chain entries, oldest first.
    pub async fn entries(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<AuditLedgerEntry>, WorkflowError> {
        Ok(self.store.ledger_entries(document_id).await?)
    }
}
