//! Core data model for controlled documents and their workflow instances.
//!
//! Everything here is plain data. Documents are mutated only through the
//! transition executor; transition records and ledger entries are immutable
//! once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique handle for a controlled document (e.g. "SOP-0042").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque reference to a user in the (external) identity system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reserved identity the scheduler acts under.
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role capabilities consumed from the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Reviewer,
    Approver,
    QualityAdmin,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Author => "author",
            Role::Reviewer => "reviewer",
            Role::Approver => "approver",
            Role::QualityAdmin => "quality_admin",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(Role::Author),
            "reviewer" => Ok(Role::Reviewer),
            "approver" => Ok(Role::Approver),
            "quality_admin" => Ok(Role::QualityAdmin),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The identity attempting a transition, with the role it claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub asserted_role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, asserted_role: Role) -> Self {
        Self {
            id: ActorId::new(id),
            asserted_role,
        }
    }

    /// The scheduler's actor, used for all automatic transitions.
    pub fn system() -> Self {
        Self {
            id: ActorId::system(),
            asserted_role: Role::System,
        }
    }
}

/// Internal state code (e.g. `PENDING_REVIEW`). Authoritative everywhere in
/// the core; display labels live in the naming table, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateCode(String);

impl StateCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Well-known state codes used by the built-in workflow graphs.
pub mod states {
    pub const DRAFT: &str = "DRAFT";
    pub const PENDING_REVIEW: &str = "PENDING_REVIEW";
    pub const REVIEWED: &str = "REVIEWED";
    pub const PENDING_APPROVAL: &str = "PENDING_APPROVAL";
    pub const PENDING_EFFECTIVE: &str = "PENDING_EFFECTIVE";
    pub const EFFECTIVE: &str = "EFFECTIVE";
    pub const PENDING_OBSOLETE: &str = "PENDING_OBSOLETE";
    pub const OBSOLETE: &str = "OBSOLETE";
    pub const SUPERSEDED: &str = "SUPERSEDED";
    pub const TERMINATED: &str = "TERMINATED";
}

/// Broad lifecycle phase a state belongs to. Drives sweep scanning and
/// escalation, never transition legality (that is the graph's job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCategory {
    Draft,
    InReview,
    InApproval,
    Effective,
    Terminal,
}

/// A controlled document as the workflow core sees it. File content, OCR and
/// template data live with the content collaborator and never enter here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Human-facing document version label ("1.0", "2.0"), distinct from the
    /// concurrency token below.
    pub version_label: String,
    pub workflow_type: String,
    pub current_state: StateCode,
    pub author: ActorId,
    pub reviewer: Option<ActorId>,
    pub approver: Option<ActorId>,
    pub effective_date: Option<DateTime<Utc>>,
    pub obsolescence_date: Option<DateTime<Utc>>,
    pub obsolescence_reason: Option<String>,
    /// Optimistic concurrency token, incremented on every applied transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The single active workflow instance bound to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentWorkflow {
    pub document_id: DocumentId,
    pub workflow_type: String,
    pub started_at: DateTime<Utc>,
    /// When the current review/approval step times out, if the graph defines
    /// a timeout window for the current state.
    pub due_at: Option<DateTime<Utc>>,
    /// Set once the sweep has escalated an overdue step, so redundant sweeps
    /// do not spam the notification collaborator.
    pub escalated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentWorkflow {
    pub fn is_terminal(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Outcome recorded on a transition. Rejections never reach the history, so
/// in practice stored records are always `Applied`; the variant exists so the
/// record format does not need to change if that policy ever does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied,
    Rejected,
}

/// Immutable record of one applied state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTransition {
    pub document_id: DocumentId,
    pub from_state: StateCode,
    pub to_state: StateCode,
    pub actor: ActorId,
    pub asserted_role: Role,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub outcome: TransitionOutcome,
}

/// Consistent read of a document together with its workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub document: Document,
    pub workflow: DocumentWorkflow,
}
