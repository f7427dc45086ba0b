//! Scheduler sweep: date-gated automatic transitions and overdue escalation.
//!
//! The sweep owns no state of its own. Each run scans the store for
//! documents sitting in a date-gated state whose gate has passed and applies
//! the scheduled transition as the system actor through the normal executor
//! path, so automatic moves are validated, versioned and audited exactly
//! like manual ones. Overlapping or redundant runs are safe: a document
//! already moved simply fails the version or edge check and is skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::WorkflowError;
use crate::executor::{TransitionExecutor, TransitionRequest};
use crate::model::{states, Actor, DocumentId, DocumentSnapshot, StateCategory, StateCode};
use crate::notify::{NotificationEvent, NotificationKind, NotificationSink};
use crate::store::WorkflowStore;
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::workflow::{StateGraphRegistry, TransitionEdge};

/// What one sweep run did.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    /// Documents moved by a scheduled transition this run.
    pub transitioned: Vec<DocumentId>,
    /// Documents whose overdue step was escalated this run.
    pub escalated: Vec<DocumentId>,
}

pub struct Sweeper {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<StateGraphRegistry>,
    executor: Arc<TransitionExecutor>,
    notifier: Arc<dyn NotificationSink>,
    escalation_enabled: bool,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<StateGraphRegistry>,
        executor: Arc<TransitionExecutor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            registry,
            executor,
            notifier,
            escalation_enabled: true,
        }
    }

    pub fn without_escalation(mut self) -> Self {
        self.escalation_enabled = false;
        self
    }

    /// One idempotent sweep pass at the given clock reading. Each run logs
    /// under its own span with a fresh correlation id, so overlapping runs
    /// stay distinguishable in the output.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("sweep", None, Some(&correlation_id));
        self.sweep_inner(now).instrument(span).await
    }

    async fn sweep_inner(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let mut report = SweepReport::default();

        let mut scan_states: Vec<StateCode> = Vec::new();
        for graph in self.registry.graphs() {
            for code in graph.scheduled_states() {
                if !scan_states.contains(code) {
                    scan_states.push(code.clone());
                }
            }
        }

        let candidates = self.store.documents_in_states(&scan_states).await?;
        debug!(
            candidates = candidates.len(),
            scan_states = ?scan_states.iter().map(StateCode::as_str).collect::<Vec<_>>(),
            "Sweep scanning date-gated states"
        );

        for snapshot in candidates {
            let document = &snapshot.document;
            let Some(graph) = self.registry.graph(&document.workflow_type) else {
                warn!(
                    document_id = %document.id,
                    workflow_type = %document.workflow_type,
                    "Skipping document with unregistered workflow type"
                );
                continue;
            };
            let Some(edge) = graph.scheduled_edge(&document.current_state) else {
                continue;
            };
            let Some(gate) = gate_date(&snapshot, edge) else {
                continue;
            };
            if gate > now {
                continue;
            }

            match self.apply_scheduled(&snapshot, edge).await {
                Ok(()) => report.transitioned.push(document.id.clone()),
                // Another sweep or a manual caller got there first; this run
                // has nothing left to do for the document.
                Err(
                    WorkflowError::ConcurrencyConflict { .. }
                    | WorkflowError::InvalidTransition { .. }
                    | WorkflowError::NotFound { .. },
                ) => {
                    debug!(document_id = %document.id, "Document already moved, skipping");
                }
                Err(err) => {
                    error!(
                        document_id = %document.id,
                        error = %err,
                        "Scheduled transition failed; will retry next sweep"
                    );
                }
            }
        }

        if self.escalation_enabled {
            self.escalate_overdue(now, &mut report).await?;
        }

        info!(
            transitioned = report.transitioned.len(),
            escalated = report.escalated.len(),
            "Sweep complete"
        );
        Ok(report)
    }

    async fn apply_scheduled(
        &self,
        snapshot: &DocumentSnapshot,
        edge: &TransitionEdge,
    ) -> Result<(), WorkflowError> {
        let request = TransitionRequest::new(
            snapshot.document.id.clone(),
            edge.to.clone(),
            Actor::system(),
            snapshot.document.version,
        );
        let applied = self.executor.apply_transition(request).await?;
        info!(
            document_id = %applied.transition.document_id,
            from_state = %applied.transition.from_state,
            to_state = %applied.transition.to_state,
            "Scheduled transition applied"
        );
        Ok(())
    }

    /// Emit overdue events for review/approval steps past their due window.
    /// No state changes here; escalation is bookkeeping plus notification.
    async fn escalate_overdue(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), WorkflowError> {
        for snapshot in self.store.overdue_workflows(now).await? {
            let document = &snapshot.document;
            let category = self
                .registry
                .graph(&document.workflow_type)
                .and_then(|g| g.state(&document.current_state))
                .map(|s| s.category);
            if !matches!(
                category,
                Some(StateCategory::InReview | StateCategory::InApproval)
            ) {
                continue;
            }

            let assignee = match category {
                Some(StateCategory::InReview) => document.reviewer.clone(),
                Some(StateCategory::InApproval) => document.approver.clone(),
                _ => None,
            }
            .unwrap_or_else(|| document.author.clone());

            warn!(
                document_id = %document.id,
                state = %document.current_state,
                due_at = ?snapshot.workflow.due_at,
                assignee = %assignee,
                "Workflow step overdue, escalating"
            );
            self.notifier
                .deliver(NotificationEvent {
                    document_id: document.id.clone(),
                    kind: NotificationKind::Overdue,
                    actor_id: assignee,
                    timestamp: now,
                })
                .await;
            self.store.record_escalation(&document.id, now).await?;
            report.escalated.push(document.id.clone());
        }
        Ok(())
    }

    /// Run sweeps on a fixed interval until the shutdown signal flips.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "Sweep loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_sweep(Utc::now()).await {
                        error!(error = %err, "Sweep run failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Sweep loop stopping");
                        return;
                    }
                }
            }
        }
    }
}

fn gate_date(snapshot: &DocumentSnapshot, edge: &TransitionEdge) -> Option<DateTime<Utc>> {
    match edge.to.as_str() {
        states::EFFECTIVE => snapshot.document.effective_date,
        states::OBSOLETE => snapshot.document.obsolescence_date,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::instance::{NewDocument, WorkflowInstanceManager};
    use crate::model::Role;
    use crate::notify::CollectingSink;
    use crate::roles::StaticRoleResolver;
    use crate::store::MemoryStore;
    use crate::workflow::workflow_types;

    struct Harness {
        store: Arc<MemoryStore>,
        executor: Arc<TransitionExecutor>,
        sweeper: Sweeper,
        sink: Arc<CollectingSink>,
        manager: WorkflowInstanceManager,
    }

    fn harness() -> Harness {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(StateGraphRegistry::with_defaults());
        let sink = Arc::new(CollectingSink::new());
        let executor = Arc::new(TransitionExecutor::new(
            store.clone(),
            registry.clone(),
            Arc::new(StaticRoleResolver::default()),
            sink.clone(),
        ));
        let sweeper = Sweeper::new(
            store.clone(),
            registry.clone(),
            executor.clone(),
            sink.clone(),
        );
        let manager = WorkflowInstanceManager::new(store.clone(), registry);
        Harness {
            store,
            executor,
            sweeper,
            sink,
            manager,
        }
    }

    async fn drive_to_pending_effective(h: &Harness, id: &str, effective: DateTime<Utc>) {
        h.manager
            .create_document(
                NewDocument::new(id, "Gowning procedure", "alice")
                    .with_reviewer("rita")
                    .with_approver("adam"),
                workflow_types::REVIEW,
                &Actor::new("alice", Role::Author),
            )
            .await
            .unwrap();

        let steps = [
            (states::PENDING_REVIEW, Actor::new("alice", Role::Author)),
            (states::REVIEWED, Actor::new("rita", Role::Reviewer)),
            (states::PENDING_APPROVAL, Actor::new("alice", Role::Author)),
        ];
        let mut version = 0;
        for (to, actor) in steps {
            h.executor
                .apply_transition(TransitionRequest::new(id, to, actor, version))
                .await
                .unwrap();
            version += 1;
        }
        h.executor
            .apply_transition(
                TransitionRequest::new(
                    id,
                    states::PENDING_EFFECTIVE,
                    Actor::new("adam", Role::Approver),
                    version,
                )
                .with_effective_date(effective),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_promotes_documents_past_their_effective_date() {
        let h = harness();
        let effective = Utc::now() - ChronoDuration::hours(1);
        drive_to_pending_effective(&h, "SOP-001", effective).await;

        let report = h.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(report.transitioned, vec![DocumentId::from("SOP-001")]);

        let snapshot = h
            .store
            .snapshot(&DocumentId::from("SOP-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.document.current_state.as_str(), states::EFFECTIVE);
        // The automatic move is attributed to the system actor in history.
        let transitions = h
            .store
            .transitions(&DocumentId::from("SOP-001"), None)
            .await
            .unwrap();
        let last = transitions.last().unwrap();
        assert_eq!(last.actor.as_str(), "system");
        assert_eq!(last.asserted_role, Role::System);
    }

    #[tokio::test]
    async fn sweep_leaves_future_dates_alone() {
        let h = harness();
        let effective = Utc::now() + ChronoDuration::days(3);
        drive_to_pending_effective(&h, "SOP-001", effective).await;

        let report = h.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert!(report.transitioned.is_empty());

        let snapshot = h
            .store
            .snapshot(&DocumentId::from("SOP-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.document.current_state.as_str(),
            states::PENDING_EFFECTIVE
        );
    }

    #[tokio::test]
    async fn redundant_sweeps_are_no_ops() {
        let h = harness();
        let effective = Utc::now() - ChronoDuration::hours(1);
        drive_to_pending_effective(&h, "SOP-001", effective).await;

        let first = h.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(first.transitioned.len(), 1);
        let second = h.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert!(second.transitioned.is_empty());

        // Exactly one EFFECTIVE transition in history, not two.
        let transitions = h
            .store
            .transitions(&DocumentId::from("SOP-001"), None)
            .await
            .unwrap();
        let effective_moves = transitions
            .iter()
            .filter(|t| t.to_state.as_str() == states::EFFECTIVE)
            .count();
        assert_eq!(effective_moves, 1);
    }

    #[tokio::test]
    async fn overdue_steps_are_escalated_once() {
        let h = harness();
        h.manager
            .create_document(
                NewDocument::new("SOP-002", "Deviation SOP", "alice").with_reviewer("rita"),
                workflow_types::REVIEW,
                &Actor::new("alice", Role::Author),
            )
            .await
            .unwrap();
        h.executor
            .apply_transition(TransitionRequest::new(
                "SOP-002",
                states::PENDING_REVIEW,
                Actor::new("alice", Role::Author),
                0,
            ))
            .await
            .unwrap();

        // Jump the clock past the review timeout window.
        let later = Utc::now() + ChronoDuration::days(8);
        let report = h.sweeper.run_sweep(later).await.unwrap();
        assert_eq!(report.escalated, vec![DocumentId::from("SOP-002")]);

        let overdue = h.sink.events_of_kind(NotificationKind::Overdue);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].actor_id.as_str(), "rita");

        // Escalation does not change document state, and a second sweep at
        // the same clock stays quiet.
        let snapshot = h
            .store
            .snapshot(&DocumentId::from("SOP-002"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.document.current_state.as_str(),
            states::PENDING_REVIEW
        );
        let again = h.sweeper.run_sweep(later).await.unwrap();
        assert!(again.escalated.is_empty());
        assert_eq!(h.sink.events_of_kind(NotificationKind::Overdue).len(), 1);
    }
}
