//! Audit ledger integrity: chain verification, tamper evidence, and the
//! all-or-nothing coupling between state changes and ledger appends.

mod common;

use chrono::{Duration, Utc};
use common::*;
use docwarden::ledger::chain::{seal_entry, verify_entries, GENESIS_HASH};
use docwarden::ledger::{ChainStatus, LedgerPayload};
use docwarden::model::states;
use docwarden::workflow::workflow_types;
use docwarden::{
    ActorId, DocumentId, Role, StateCode, TransitionOutcome, TransitionRequest, WorkflowError,
    WorkflowStore,
};

#[tokio::test]
async fn persisted_chain_verifies_end_to_end() {
    let h = harness();
    drive_to_pending_approval(&h, "SOP-001").await;

    let id = DocumentId::from("SOP-001");
    assert!(h.ledger.verify_chain(&id).await.unwrap().is_valid());

    let entries = h.ledger.entries(&id).await.unwrap();
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].entry_hash);
    }
}

#[tokio::test]
async fn tampered_payload_is_detected_at_the_right_index() {
    let h = harness();
    drive_to_pending_approval(&h, "SOP-002").await;

    let id = DocumentId::from("SOP-002");
    let mut entries = h.ledger.entries(&id).await.unwrap();

    // An auditor pulls the chain and someone has edited entry 2 in flight.
    entries[2].payload = entries[2].payload.replace("rita", "mallory");
    assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(2));
}

#[tokio::test]
async fn truncated_chain_is_detected() {
    let h = harness();
    drive_to_pending_approval(&h, "SOP-003").await;

    let id = DocumentId::from("SOP-003");
    let mut entries = h.ledger.entries(&id).await.unwrap();
    entries.pop();
    // Dropping the tail still verifies (nothing after it to disagree), but
    // removing an interior entry cannot.
    assert_eq!(verify_entries(&entries), ChainStatus::Valid);
    entries.remove(1);
    assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(1));
}

#[tokio::test]
async fn failed_ledger_append_fails_the_whole_transition() {
    let h = harness();
    h.manager
        .create_document(
            docwarden::NewDocument::new("SOP-004", "Labeling SOP", "alice"),
            workflow_types::REVIEW,
            &author(),
        )
        .await
        .unwrap();

    h.store.inject_ledger_failure();
    let err = h
        .executor
        .apply_transition(TransitionRequest::new(
            "SOP-004",
            states::PENDING_REVIEW,
            author(),
            0,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AuditWriteFailure { .. }));

    // The state change was rolled back with the append.
    let id = DocumentId::from("SOP-004");
    let snapshot = h.store.snapshot(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.document.current_state.as_str(), states::DRAFT);
    assert_eq!(snapshot.document.version, 0);
    assert!(h.ledger.list_transitions(&id, None).await.unwrap().is_empty());

    // The injected fault is one-shot; the retried request goes through.
    h.executor
        .apply_transition(TransitionRequest::new(
            "SOP-004",
            states::PENDING_REVIEW,
            author(),
            0,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn ledger_payload_round_trips_the_transition_detail() {
    let h = harness();
    h.manager
        .create_document(
            docwarden::NewDocument::new("SOP-005", "Validation master plan", "alice"),
            workflow_types::REVIEW,
            &author(),
        )
        .await
        .unwrap();
    h.executor
        .apply_transition(
            TransitionRequest::new("SOP-005", states::PENDING_REVIEW, author(), 0)
                .with_comment("ready for review"),
        )
        .await
        .unwrap();

    let id = DocumentId::from("SOP-005");
    let entries = h.ledger.entries(&id).await.unwrap();
    let payload: LedgerPayload = serde_json::from_str(&entries[1].payload).unwrap();
    match payload {
        LedgerPayload::Transition {
            from_state,
            to_state,
            actor,
            asserted_role,
            comment,
            outcome,
            ..
        } => {
            assert_eq!(from_state.as_str(), states::DRAFT);
            assert_eq!(to_state.as_str(), states::PENDING_REVIEW);
            assert_eq!(actor.as_str(), "alice");
            assert_eq!(asserted_role, Role::Author);
            assert_eq!(comment.as_deref(), Some("ready for review"));
            assert_eq!(outcome, TransitionOutcome::Applied);
        }
        other => panic!("expected a transition payload, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_requests_leave_no_trace_in_the_ledger() {
    let h = harness();
    h.manager
        .create_document(
            docwarden::NewDocument::new("SOP-006", "Change control SOP", "alice"),
            workflow_types::REVIEW,
            &author(),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        let _ = h
            .executor
            .apply_transition(TransitionRequest::new(
                "SOP-006",
                states::EFFECTIVE,
                author(),
                0,
            ))
            .await
            .unwrap_err();
    }

    let id = DocumentId::from("SOP-006");
    assert_eq!(h.ledger.entries(&id).await.unwrap().len(), 1);
    assert!(h.ledger.list_transitions(&id, None).await.unwrap().is_empty());
}

#[test]
fn manually_built_chain_matches_sealed_hashes() {
    let id = DocumentId::from("SOP-007");
    let payload = LedgerPayload::Transition {
        document_id: id.clone(),
        from_state: StateCode::from(states::DRAFT),
        to_state: StateCode::from(states::PENDING_REVIEW),
        actor: ActorId::new("alice"),
        asserted_role: Role::Author,
        comment: None,
        timestamp: Utc::now(),
        outcome: TransitionOutcome::Applied,
    };

    let first = seal_entry(&id, 0, None, &payload, Utc::now());
    let second = seal_entry(&id, 1, Some(&first.entry_hash), &payload, Utc::now());
    assert_eq!(first.prev_hash, GENESIS_HASH);
    assert_eq!(second.prev_hash, first.entry_hash);
    assert_eq!(verify_entries(&[first, second]), ChainStatus::Valid);
}

#[tokio::test]
async fn sweep_transitions_are_audited_like_manual_ones() {
    let h = harness();
    let effective = Utc::now() - Duration::hours(1);
    drive_to_effective(&h, "SOP-008", effective).await;

    let id = DocumentId::from("SOP-008");
    let entries = h.ledger.entries(&id).await.unwrap();
    let last: LedgerPayload = serde_json::from_str(&entries.last().unwrap().payload).unwrap();
    match last {
        LedgerPayload::Transition {
            to_state,
            actor,
            asserted_role,
            ..
        } => {
            assert_eq!(to_state.as_str(), states::EFFECTIVE);
            assert_eq!(actor, ActorId::system());
            assert_eq!(asserted_role, Role::System);
        }
        other => panic!("expected a transition payload, got {other:?}"),
    }
    assert!(h.ledger.verify_chain(&id).await.unwrap().is_valid());
}
