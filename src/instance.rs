//! Workflow instance lifecycle: starting a workflow for a document and the
//! one-active-instance rule.
//!
//! A workflow instance is born with the graph's initial state and dies
//! implicitly when the document reaches a state with no outgoing edges; there
//! is no separate completion call. Starting a workflow writes the chain's
//! genesis entry for that instance.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{StorageError, WorkflowError};
use crate::ledger::chain::LedgerPayload;
use crate::model::{Actor, ActorId, Document, DocumentId, DocumentSnapshot, DocumentWorkflow};
use crate::store::WorkflowStore;
use crate::workflow::StateGraphRegistry;

/// Metadata needed to register a document with its first workflow.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: DocumentId,
    pub title: String,
    pub version_label: String,
    pub author: ActorId,
    pub reviewer: Option<ActorId>,
    pub approver: Option<ActorId>,
}

impl NewDocument {
    pub fn new(
        id: impl Into<DocumentId>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            version_label: "1.0".to_string(),
            author: ActorId::new(author),
            reviewer: None,
            approver: None,
        }
    }

    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = label.into();
        self
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = Some(ActorId::new(reviewer));
        self
    }

    pub fn with_approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(ActorId::new(approver));
        self
    }
}

pub struct WorkflowInstanceManager {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<StateGraphRegistry>,
}

impl WorkflowInstanceManager {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<StateGraphRegistry>) -> Self {
        Self { store, registry }
    }

    /// Register a new document and start its first workflow instance.
    pub async fn create_document(
        &self,
        new_document: NewDocument,
        workflow_type: &str,
        actor: &Actor,
    ) -> Result<DocumentSnapshot, WorkflowError> {
        let graph = self.registry.graph(workflow_type).ok_or_else(|| {
            WorkflowError::UnknownWorkflowType {
                workflow_type: workflow_type.to_string(),
            }
        })?;
        let now = Utc::now();
        let document = Document {
            id: new_document.id.clone(),
            title: new_document.title,
            version_label: new_document.version_label,
            workflow_type: workflow_type.to_string(),
            current_state: graph.initial_state().clone(),
            author: new_document.author,
            reviewer: new_document.reviewer,
            approver: new_document.approver,
            effective_date: None,
            obsolescence_date: None,
            obsolescence_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let workflow = DocumentWorkflow {
            document_id: new_document.id.clone(),
            workflow_type: workflow_type.to_string(),
            started_at: now,
            due_at: None,
            escalated_at: None,
            completed_at: None,
        };
        let genesis = LedgerPayload::WorkflowStarted {
            document_id: new_document.id.clone(),
            workflow_type: workflow_type.to_string(),
            actor: actor.id.clone(),
            timestamp: now,
        };

        let snapshot = self
            .store
            .create_document(document, workflow, genesis)
            .await?;

        info!(
            document_id = %new_document.id,
            workflow_type,
            initial_state = %snapshot.document.current_state,
            actor_id = %actor.id,
            "Document registered and workflow started"
        );
        Ok(snapshot)
    }

    /// Start another workflow on an existing document (up-versioning or
    /// obsolescence of an effective document). Only one instance may be
    /// active per document at a time.
    pub async fn start_workflow(
        &self,
        document_id: &DocumentId,
        workflow_type: &str,
        actor: &Actor,
    ) -> Result<DocumentSnapshot, WorkflowError> {
        let graph = self.registry.graph(workflow_type).ok_or_else(|| {
            WorkflowError::UnknownWorkflowType {
                workflow_type: workflow_type.to_string(),
            }
        })?;
        let now = Utc::now();
        let workflow = DocumentWorkflow {
            document_id: document_id.clone(),
            workflow_type: workflow_type.to_string(),
            started_at: now,
            due_at: None,
            escalated_at: None,
            completed_at: None,
        };
        let genesis = LedgerPayload::WorkflowStarted {
            document_id: document_id.clone(),
            workflow_type: workflow_type.to_string(),
            actor: actor.id.clone(),
            timestamp: now,
        };

        let snapshot = self
            .store
            .start_workflow(
                document_id,
                workflow,
                graph.initial_state().clone(),
                genesis,
            )
            .await
            .map_err(|err| match err {
                StorageError::WorkflowActive {
                    document_id,
                    workflow_type,
                } => WorkflowError::WorkflowAlreadyActive {
                    document_id,
                    workflow_type,
                },
                StorageError::DocumentMissing { document_id } => {
                    WorkflowError::NotFound { document_id }
                }
                other => WorkflowError::Storage(other),
            })?;

        info!(
            document_id = %document_id,
            workflow_type,
            initial_state = %snapshot.document.current_state,
            actor_id = %actor.id,
            "Workflow started on existing document"
        );
        Ok(snapshot)
    }
}
