//! Read-through cache for document snapshots.
//!
//! Serves dashboard-style reads (status listings, history headers) without
//! hitting the store. The executor invalidates on every applied transition;
//! validation itself always reads the authoritative store, so a stale cache
//! can never admit an illegal transition.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::StorageError;
use crate::model::{DocumentId, DocumentSnapshot};
use crate::store::WorkflowStore;

pub struct StateCache {
    inner: Cache<DocumentId, DocumentSnapshot>,
    store: Arc<dyn WorkflowStore>,
}

impl StateCache {
    pub fn new(store: Arc<dyn WorkflowStore>, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(300))
            .build();
        Self { inner, store }
    }

    /// Cached snapshot, falling back to the store on a miss. Misses for
    /// documents that do not exist are not cached.
    pub async fn snapshot(
        &self,
        id: &DocumentId,
    ) -> Result<Option<DocumentSnapshot>, StorageError> {
        if let Some(snapshot) = self.inner.get(id).await {
            return Ok(Some(snapshot));
        }
        match self.store.snapshot(id).await? {
            Some(snapshot) => {
                self.inner.insert(id.clone(), snapshot.clone()).await;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self, id: &DocumentId) {
        debug!(document_id = %id, "Invalidating cached snapshot");
        self.inner.invalidate(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ledger::chain::LedgerPayload;
    use crate::model::states::DRAFT;
    use crate::model::{ActorId, Document, DocumentWorkflow, StateCode};
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, id: &str) {
        let now = Utc::now();
        let document = Document {
            id: DocumentId::from(id),
            title: "Calibration SOP".to_string(),
            version_label: "1.0".to_string(),
            workflow_type: "review".to_string(),
            current_state: StateCode::from(DRAFT),
            author: ActorId::new("alice"),
            reviewer: None,
            approver: None,
            effective_date: None,
            obsolescence_date: None,
            obsolescence_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let workflow = DocumentWorkflow {
            document_id: DocumentId::from(id),
            workflow_type: "review".to_string(),
            started_at: now,
            due_at: None,
            escalated_at: None,
            completed_at: None,
        };
        let genesis = LedgerPayload::WorkflowStarted {
            document_id: DocumentId::from(id),
            workflow_type: "review".to_string(),
            actor: ActorId::new("alice"),
            timestamp: now,
        };
        store.create_document(document, workflow, genesis).await.unwrap();
    }

    #[tokio::test]
    async fn miss_populates_and_hit_serves_from_cache() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "SOP-001").await;
        let cache = StateCache::new(store.clone(), 64);

        let id = DocumentId::from("SOP-001");
        let first = cache.snapshot(&id).await.unwrap().unwrap();
        let second = cache.snapshot(&id).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_read() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "SOP-001").await;
        let cache = StateCache::new(store.clone(), 64);

        let id = DocumentId::from("SOP-001");
        cache.snapshot(&id).await.unwrap();
        cache.invalidate(&id).await;
        assert!(cache.snapshot(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_documents_are_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = StateCache::new(store.clone(), 64);
        let id = DocumentId::from("SOP-404");
        assert!(cache.snapshot(&id).await.unwrap().is_none());

        seed(&store, "SOP-404").await;
        assert!(cache.snapshot(&id).await.unwrap().is_some());
    }
}
