//! Shared wiring for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docwarden::instance::{NewDocument, WorkflowInstanceManager};
use docwarden::ledger::AuditLedger;
use docwarden::model::states;
use docwarden::notify::CollectingSink;
use docwarden::roles::StaticRoleResolver;
use docwarden::store::MemoryStore;
use docwarden::sweep::Sweeper;
use docwarden::workflow::{workflow_types, StateGraphRegistry};
use docwarden::{Actor, Role, TransitionExecutor, TransitionRequest};

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<StateGraphRegistry>,
    pub executor: Arc<TransitionExecutor>,
    pub manager: WorkflowInstanceManager,
    pub ledger: AuditLedger,
    pub sweeper: Sweeper,
    pub sink: Arc<CollectingSink>,
}

pub fn harness() -> TestHarness {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(StateGraphRegistry::with_defaults());
    let sink = Arc::new(CollectingSink::new());
    let roles = Arc::new(
        StaticRoleResolver::new()
            .with_role("alice", Role::Author)
            .with_role("rita", Role::Reviewer)
            .with_role("adam", Role::Approver)
            .with_role("quinn", Role::QualityAdmin),
    );
    let executor = Arc::new(TransitionExecutor::new(
        store.clone(),
        registry.clone(),
        roles,
        sink.clone(),
    ));
    let manager = WorkflowInstanceManager::new(store.clone(), registry.clone());
    let ledger = AuditLedger::new(store.clone());
    let sweeper = Sweeper::new(
        store.clone(),
        registry.clone(),
        executor.clone(),
        sink.clone(),
    );
    TestHarness {
        store,
        registry,
        executor,
        manager,
        ledger,
        sweeper,
        sink,
    }
}

pub fn author() -> Actor {
    Actor::new("alice", Role::Author)
}

pub fn reviewer() -> Actor {
    Actor::new("rita", Role::Reviewer)
}

pub fn approver() -> Actor {
    Actor::new("adam", Role::Approver)
}

pub fn quality_admin() -> Actor {
    Actor::new("quinn", Role::QualityAdmin)
}

/// Register a document and walk it through review up to PENDING_APPROVAL.
/// Returns the document's version token afterwards.
pub async fn drive_to_pending_approval(h: &TestHarness, id: &str) -> u64 {
    h.manager
        .create_document(
            NewDocument::new(id, "Equipment cleaning SOP", "alice")
                .with_reviewer("rita")
                .with_approver("adam"),
            workflow_types::REVIEW,
            &author(),
        )
        .await
        .unwrap();

    let steps = [
        (states::PENDING_REVIEW, author()),
        (states::REVIEWED, reviewer()),
        (states::PENDING_APPROVAL, author()),
    ];
    let mut version = 0;
    for (to, actor) in steps {
        h.executor
            .apply_transition(TransitionRequest::new(id, to, actor, version))
            .await
            .unwrap();
        version += 1;
    }
    version
}

/// Drive a document all the way to EFFECTIVE: approval with an already-past
/// effective date, then one sweep pass to apply the scheduled move.
pub async fn drive_to_effective(h: &TestHarness, id: &str, effective: DateTime<Utc>) -> u64 {
    let version = drive_to_pending_approval(h, id).await;
    h.executor
        .apply_transition(
            TransitionRequest::new(id, states::PENDING_EFFECTIVE, approver(), version)
                .with_effective_date(effective),
        )
        .await
        .unwrap();
    h.sweeper.run_sweep(Utc::now()).await.unwrap();
    version + 2
}
