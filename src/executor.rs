//! Transition executor: validates a requested state change and applies it
//! atomically together with its audit entry.
//!
//! Validation is ordered and fails fast; a rejection at any step mutates
//! nothing and writes no audit entry. Rejections are logged as access-denied
//! events but never enter the transition history, which keeps replay
//! semantics clean.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn, Instrument};

use crate::cache::StateCache;
use crate::error::{StorageError, WorkflowError};
use crate::model::{
    states, Actor, ActorId, DocumentId, DocumentSnapshot, DocumentTransition, StateCategory,
    StateCode, TransitionOutcome,
};
use crate::notify::{NotificationEvent, NotificationKind, NotificationSink};
use crate::roles::RoleResolver;
use crate::store::{with_backoff, RetryPolicy, TransitionCommit, WorkflowStore};
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::workflow::graph::TransitionEdge;
use crate::workflow::StateGraphRegistry;

/// One requested state change.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub document_id: DocumentId,
    pub to_state: StateCode,
    pub actor: Actor,
    pub comment: Option<String>,
    /// The document version the caller read. A mismatch yields
    /// `ConcurrencyConflict`; the caller must re-read and decide again.
    pub expected_version: u64,
    /// Lifecycle dates the transition carries (e.g. the approver supplies
    /// the effective date while approving).
    pub effective_date: Option<DateTime<Utc>>,
    pub obsolescence_date: Option<DateTime<Utc>>,
    pub obsolescence_reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(
        document_id: impl Into<DocumentId>,
        to_state: impl Into<StateCode>,
        actor: Actor,
        expected_version: u64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            to_state: to_state.into(),
            actor,
            comment: None,
            expected_version,
            effective_date: None,
            obsolescence_date: None,
            obsolescence_reason: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_effective_date(mut self, date: DateTime<Utc>) -> Self {
        self.effective_date = Some(date);
        self
    }

    pub fn with_obsolescence(mut self, date: DateTime<Utc>, reason: impl Into<String>) -> Self {
        self.obsolescence_date = Some(date);
        self.obsolescence_reason = Some(reason.into());
        self
    }
}

/// Successful result: the post-transition snapshot and the record that was
/// appended to the history.
#[derive(Debug, Clone)]
pub struct TransitionApplied {
    pub snapshot: DocumentSnapshot,
    pub transition: DocumentTransition,
}

pub struct TransitionExecutor {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<StateGraphRegistry>,
    roles: Arc<dyn RoleResolver>,
    notifier: Arc<dyn NotificationSink>,
    cache: Option<Arc<StateCache>>,
    retry: RetryPolicy,
    /// When set, asserted roles are cross-checked against the identity
    /// collaborator instead of being taken at face value.
    distrust_assertions: bool,
}

impl TransitionExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<StateGraphRegistry>,
        roles: Arc<dyn RoleResolver>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            registry,
            roles,
            notifier,
            cache: None,
            retry: RetryPolicy::default(),
            distrust_assertions: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<StateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_distrusted_assertions(mut self) -> Self {
        self.distrust_assertions = true;
        self
    }

    /// Validate and atomically apply one transition. Everything the
    /// transition logs shares one span carrying a fresh correlation id.
    pub async fn apply_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionApplied, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(
            "apply_transition",
            Some(request.document_id.as_str()),
            Some(&correlation_id),
        );
        async {
            let result = self.apply_inner(&request).await;
            if let Err(err) = &result {
                // Access-denied events are logged, never written to the
                // transition history.
                warn!(
                    document_id = %request.document_id,
                    to_state = %request.to_state,
                    actor_id = %request.actor.id,
                    asserted_role = %request.actor.asserted_role,
                    error = %err,
                    "Transition rejected"
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn apply_inner(
        &self,
        request: &TransitionRequest,
    ) -> Result<TransitionApplied, WorkflowError> {
        // 1. Document exists and its workflow is still active.
        let snapshot = self
            .store
            .snapshot(&request.document_id)
            .await?
            .filter(|s| !s.workflow.is_terminal())
            .ok_or_else(|| WorkflowError::NotFound {
                document_id: request.document_id.clone(),
            })?;
        let document = &snapshot.document;

        // 2. Optimistic concurrency token.
        if document.version != request.expected_version {
            return Err(WorkflowError::ConcurrencyConflict {
                document_id: request.document_id.clone(),
                expected: request.expected_version,
                actual: document.version,
            });
        }

        // 3. Edge legality, then role sufficiency. Distinct error kinds: a
        // missing edge is a caller bug or stale UI, a role mismatch is a
        // permission problem.
        let graph = self.registry.graph(&document.workflow_type).ok_or_else(|| {
            WorkflowError::UnknownWorkflowType {
                workflow_type: document.workflow_type.clone(),
            }
        })?;
        let candidates: Vec<&TransitionEdge> = graph
            .allowed_transitions(&document.current_state)
            .iter()
            .filter(|e| e.to == request.to_state)
            .collect();
        if candidates.is_empty() {
            return Err(WorkflowError::InvalidTransition {
                document_id: request.document_id.clone(),
                workflow_type: document.workflow_type.clone(),
                from: document.current_state.clone(),
                to: request.to_state.clone(),
            });
        }
        let edge_allows_role = candidates
            .iter()
            .any(|e| e.required_role == request.actor.asserted_role);
        if !edge_allows_role {
            return Err(WorkflowError::UnauthorizedActor {
                document_id: request.document_id.clone(),
                from: document.current_state.clone(),
                to: request.to_state.clone(),
                asserted_role: request.actor.asserted_role,
                required_roles: candidates.iter().map(|e| e.required_role).collect(),
            });
        }
        // Only the scheduler identity itself is exempt from the cross-check;
        // asserting the system role does not grant the exemption.
        if self.distrust_assertions && request.actor.id != ActorId::system() {
            let resolved = self
                .roles
                .resolve(&request.actor.id)
                .await
                .map_err(|e| StorageError::Unavailable {
                    reason: e.to_string(),
                })?;
            if resolved != Some(request.actor.asserted_role) {
                return Err(WorkflowError::UnauthorizedActor {
                    document_id: request.document_id.clone(),
                    from: document.current_state.clone(),
                    to: request.to_state.clone(),
                    asserted_role: request.actor.asserted_role,
                    required_roles: candidates.iter().map(|e| e.required_role).collect(),
                });
            }
        }

        // 4. Transition-specific business preconditions.
        self.check_preconditions(&snapshot, request)?;

        // 5. Atomic commit: version, state, transition record and ledger
        // entry together, or nothing.
        let now = Utc::now();
        let transition = DocumentTransition {
            document_id: request.document_id.clone(),
            from_state: document.current_state.clone(),
            to_state: request.to_state.clone(),
            actor: request.actor.id.clone(),
            asserted_role: request.actor.asserted_role,
            comment: request.comment.clone(),
            timestamp: now,
            outcome: TransitionOutcome::Applied,
        };
        let due_at = graph
            .timeout_minutes(&request.to_state)
            .map(|minutes| now + Duration::minutes(minutes));
        let commit = TransitionCommit {
            document_id: request.document_id.clone(),
            expected_version: request.expected_version,
            to_state: request.to_state.clone(),
            transition: transition.clone(),
            effective_date: request.effective_date,
            obsolescence_date: request.obsolescence_date,
            obsolescence_reason: request.obsolescence_reason.clone(),
            due_at,
            completes_workflow: graph.is_completing(&request.to_state),
        };

        let store = self.store.clone();
        let snapshot = with_backoff(&self.retry, || {
            let commit = commit.clone();
            let store = store.clone();
            async move { store.commit_transition(commit).await }
        })
        .await
        .map_err(|err| self.map_commit_error(err, request))?;

        if let Some(cache) = &self.cache {
            cache.invalidate(&request.document_id).await;
        }

        info!(
            document_id = %request.document_id,
            from_state = %transition.from_state,
            to_state = %transition.to_state,
            actor_id = %transition.actor,
            asserted_role = %transition.asserted_role,
            version = snapshot.document.version,
            "Transition applied"
        );

        self.emit_events(&snapshot, &transition).await;

        Ok(TransitionApplied {
            snapshot,
            transition,
        })
    }

    fn check_preconditions(
        &self,
        snapshot: &DocumentSnapshot,
        request: &TransitionRequest,
    ) -> Result<(), WorkflowError> {
        let document = &snapshot.document;
        let precondition_failed = |rule: &str| WorkflowError::PreconditionFailed {
            document_id: request.document_id.clone(),
            from: document.current_state.clone(),
            to: request.to_state.clone(),
            rule: rule.to_string(),
        };

        match request.to_state.as_str() {
            states::PENDING_EFFECTIVE => {
                if request.effective_date.is_none() && document.effective_date.is_none() {
                    return Err(precondition_failed(
                        "an effective date must be set before effectiveness can be scheduled",
                    ));
                }
            }
            states::EFFECTIVE => {
                if document.current_state.as_str() == states::PENDING_EFFECTIVE
                    && request.effective_date.is_none()
                    && document.effective_date.is_none()
                {
                    return Err(precondition_failed("an effective date must be set"));
                }
            }
            states::OBSOLETE => {
                if request.obsolescence_reason.is_none()
                    && document.obsolescence_reason.is_none()
                {
                    return Err(precondition_failed(
                        "an obsolescence reason must be recorded before obsoleting",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn map_commit_error(&self, err: StorageError, request: &TransitionRequest) -> WorkflowError {
        match err {
            StorageError::VersionConflict {
                document_id,
                expected,
                actual,
            } => WorkflowError::ConcurrencyConflict {
                document_id,
                expected,
                actual,
            },
            StorageError::ChainBroken {
                document_id,
                broken_at,
            } => WorkflowError::AuditIntegrity {
                document_id,
                broken_at,
            },
            StorageError::LedgerAppend {
                document_id,
                reason,
            } => WorkflowError::AuditWriteFailure {
                document_id,
                reason,
            },
            StorageError::DocumentMissing { document_id } => {
                WorkflowError::NotFound { document_id }
            }
            other => {
                warn!(
                    document_id = %request.document_id,
                    error = %other,
                    "Storage failure while committing transition"
                );
                WorkflowError::Storage(other)
            }
        }
    }

    /// Downstream events are delivered to collaborators, never executed
    /// synchronously as part of the transition.
    async fn emit_events(&self, snapshot: &DocumentSnapshot, transition: &DocumentTransition) {
        self.notifier
            .deliver(NotificationEvent {
                document_id: transition.document_id.clone(),
                kind: NotificationKind::TransitionApplied,
                actor_id: transition.actor.clone(),
                timestamp: transition.timestamp,
            })
            .await;

        // Entering a review/approval step assigns a task to whoever owns
        // that step.
        let graph = self.registry.graph(&snapshot.document.workflow_type);
        let category = graph
            .and_then(|g| g.state(&snapshot.document.current_state))
            .map(|s| s.category);
        let assignee = match category {
            Some(StateCategory::InReview) => snapshot.document.reviewer.clone(),
            Some(StateCategory::InApproval) => snapshot.document.approver.clone(),
            _ => None,
        };
        if let Some(assignee) = assignee {
            self.notifier
                .deliver(NotificationEvent {
                    document_id: transition.document_id.clone(),
                    kind: NotificationKind::TaskAssigned,
                    actor_id: assignee,
                    timestamp: transition.timestamp,
                })
                .await;
        }
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;

    use crate::instance::{NewDocument, WorkflowInstanceManager};
    use crate::model::Role;
    use crate::notify::CollectingSink;
    use crate::roles::{MockRoleResolver, RoleResolveError};
    use crate::store::MemoryStore;
    use crate::workflow::workflow_types;

    #[tokio::test]
    async fn resolver_outage_fails_closed_under_distrust() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(StateGraphRegistry::with_defaults());
        let mut roles = MockRoleResolver::new();
        roles.expect_resolve().returning(|_| {
            Err(RoleResolveError::Unavailable {
                reason: "directory offline".to_string(),
            })
        });
        let executor = TransitionExecutor::new(
            store.clone(),
            registry.clone(),
            Arc::new(roles),
            Arc::new(CollectingSink::new()),
        )
        .with_distrusted_assertions();
        let manager = WorkflowInstanceManager::new(store.clone(), registry);

        manager
            .create_document(
                NewDocument::new("SOP-001", "Cleaning validation SOP", "alice"),
                workflow_types::REVIEW,
                &Actor::new("alice", Role::Author),
            )
            .await
            .unwrap();

        // With the directory unreachable the assertion cannot be confirmed,
        // so the transition is refused rather than taken on faith.
        let err = executor
            .apply_transition(TransitionRequest::new(
                "SOP-001",
                states::PENDING_REVIEW,
                Actor::new("alice", Role::Author),
                0,
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Storage(StorageError::Unavailable { .. })
        ));

        let snapshot = store
            .snapshot(&DocumentId::from("SOP-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.document.version, 0);
    }
}
