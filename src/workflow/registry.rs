//! Registry of state graphs, one per workflow type.
//!
//! Loaded once at process start, read-only afterwards. Ships with built-in
//! graphs for the standard workflow types; deployments can replace them with
//! a TOML file (see `from_toml_str`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::model::states::*;
use crate::model::{Role, StateCategory, StateCode};
use crate::workflow::graph::{GraphValidationError, StateGraph, TransitionEdge};

/// Built-in workflow type names.
pub mod workflow_types {
    pub const REVIEW: &str = "review";
    pub const UP_VERSIONING: &str = "up_versioning";
    pub const OBSOLESCENCE: &str = "obsolescence";
    pub const EMERGENCY_APPROVAL: &str = "emergency_approval";
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] GraphValidationError),

    #[error("failed to read workflow graph file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse workflow graph file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate workflow type in configuration: {workflow_type}")]
    DuplicateWorkflowType { workflow_type: String },
}

#[derive(Debug)]
pub struct StateGraphRegistry {
    graphs: HashMap<String, StateGraph>,
}

impl StateGraphRegistry {
    pub fn new(graphs: Vec<StateGraph>) -> Result<Self, RegistryError> {
        let mut map = HashMap::new();
        for graph in graphs {
            let name = graph.workflow_type().to_string();
            if map.insert(name.clone(), graph).is_some() {
                return Err(RegistryError::DuplicateWorkflowType {
                    workflow_type: name,
                });
            }
        }
        Ok(Self { graphs: map })
    }

    /// The standard graphs: review, up-versioning, obsolescence, and
    /// emergency approval.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            review_graph(),
            up_versioning_graph(),
            obsolescence_graph(),
            emergency_approval_graph(),
        ])
        .expect("built-in workflow graphs are valid")
    }

    pub fn graph(&self, workflow_type: &str) -> Option<&StateGraph> {
        self.graphs.get(workflow_type)
    }

    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn graphs(&self) -> impl Iterator<Item = &StateGraph> {
        self.graphs.values()
    }

    /// Legal outgoing edges for a state within a workflow type. Empty when
    /// either is unknown; existence checks belong to the executor.
    pub fn allowed_transitions(&self, workflow_type: &str, from: &StateCode) -> &[TransitionEdge] {
        self.graphs
            .get(workflow_type)
            .map(|g| g.allowed_transitions(from))
            .unwrap_or(&[])
    }

    /// Load graphs from a TOML file, replacing the built-in set.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RegistryError> {
        let file: GraphsFile = toml::from_str(raw)?;
        let mut graphs = Vec::with_capacity(file.workflow.len());
        for def in file.workflow {
            let mut builder = StateGraph::builder(def.name).initial(&def.initial);
            for state in def.states {
                builder = match state.timeout_minutes {
                    Some(minutes) => {
                        builder.state_with_timeout(&state.code, state.category, minutes)
                    }
                    None => builder.state(&state.code, state.category),
                };
            }
            for edge in def.edges {
                builder = if edge.scheduled {
                    builder.scheduled_edge(&edge.from, &edge.to)
                } else {
                    builder.edge(&edge.from, &edge.to, edge.role)
                };
            }
            graphs.push(builder.build()?);
        }
        Self::new(graphs)
    }
}

#[derive(Debug, Deserialize)]
struct GraphsFile {
    #[serde(default)]
    workflow: Vec<GraphDef>,
}

#[derive(Debug, Deserialize)]
struct GraphDef {
    name: String,
    initial: String,
    states: Vec<StateDef>,
    edges: Vec<EdgeDef>,
}

#[derive(Debug, Deserialize)]
struct StateDef {
    code: String,
    category: StateCategory,
    timeout_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EdgeDef {
    from: String,
    to: String,
    #[serde(default = "default_edge_role")]
    role: Role,
    #[serde(default)]
    scheduled: bool,
}

fn default_edge_role() -> Role {
    Role::System
}

/// Standard document review lifecycle: author drafts, reviewer reviews,
/// approver approves, the sweep makes it effective on the effective date.
fn review_graph() -> StateGraph {
    StateGraph::builder(workflow_types::REVIEW)
        .initial(DRAFT)
        .state(DRAFT, StateCategory::Draft)
        .state_with_timeout(PENDING_REVIEW, StateCategory::InReview, 7 * 24 * 60)
        .state(REVIEWED, StateCategory::Draft)
        .state_with_timeout(PENDING_APPROVAL, StateCategory::InApproval, 7 * 24 * 60)
        .state(PENDING_EFFECTIVE, StateCategory::InApproval)
        .state(EFFECTIVE, StateCategory::Effective)
        .state(TERMINATED, StateCategory::Terminal)
        .edge(DRAFT, PENDING_REVIEW, Role::Author)
        .edge(DRAFT, TERMINATED, Role::Author)
        .edge(DRAFT, TERMINATED, Role::QualityAdmin)
        .edge(PENDING_REVIEW, REVIEWED, Role::Reviewer)
        .edge(PENDING_REVIEW, DRAFT, Role::Reviewer)
        .edge(REVIEWED, PENDING_APPROVAL, Role::Author)
        .edge(PENDING_APPROVAL, PENDING_EFFECTIVE, Role::Approver)
        .edge(PENDING_APPROVAL, DRAFT, Role::Approver)
        .scheduled_edge(PENDING_EFFECTIVE, EFFECTIVE)
        .build()
        .expect("review graph is valid")
}

/// Up-versioning: same shape as review, but the effective document ends up
/// superseded by the newer version once that one goes effective.
fn up_versioning_graph() -> StateGraph {
    StateGraph::builder(workflow_types::UP_VERSIONING)
        .initial(DRAFT)
        .state(DRAFT, StateCategory::Draft)
        .state_with_timeout(PENDING_REVIEW, StateCategory::InReview, 7 * 24 * 60)
        .state(REVIEWED, StateCategory::Draft)
        .state_with_timeout(PENDING_APPROVAL, StateCategory::InApproval, 7 * 24 * 60)
        .state(PENDING_EFFECTIVE, StateCategory::InApproval)
        .state(EFFECTIVE, StateCategory::Effective)
        .state(SUPERSEDED, StateCategory::Terminal)
        .state(TERMINATED, StateCategory::Terminal)
        .edge(DRAFT, PENDING_REVIEW, Role::Author)
        .edge(DRAFT, TERMINATED, Role::Author)
        .edge(PENDING_REVIEW, REVIEWED, Role::Reviewer)
        .edge(PENDING_REVIEW, DRAFT, Role::Reviewer)
        .edge(REVIEWED, PENDING_APPROVAL, Role::Author)
        .edge(PENDING_APPROVAL, PENDING_EFFECTIVE, Role::Approver)
        .edge(PENDING_APPROVAL, DRAFT, Role::Approver)
        .scheduled_edge(PENDING_EFFECTIVE, EFFECTIVE)
        .edge(EFFECTIVE, SUPERSEDED, Role::QualityAdmin)
        .edge(EFFECTIVE, SUPERSEDED, Role::System)
        .build()
        .expect("up-versioning graph is valid")
}

/// Obsolescence: an effective document is routed out of service. The sweep
/// obsoletes it when the obsolescence date arrives; quality admins may do it
/// manually once the reason is recorded.
fn obsolescence_graph() -> StateGraph {
    StateGraph::builder(workflow_types::OBSOLESCENCE)
        .initial(EFFECTIVE)
        .state(EFFECTIVE, StateCategory::Effective)
        .state(PENDING_OBSOLETE, StateCategory::InApproval)
        .state(OBSOLETE, StateCategory::Terminal)
        .edge(EFFECTIVE, PENDING_OBSOLETE, Role::QualityAdmin)
        .edge(PENDING_OBSOLETE, EFFECTIVE, Role::QualityAdmin)
        .edge(PENDING_OBSOLETE, OBSOLETE, Role::QualityAdmin)
        .scheduled_edge(PENDING_OBSOLETE, OBSOLETE)
        .build()
        .expect("obsolescence graph is valid")
}

/// Emergency approval: skips review entirely, with a tight approval window.
fn emergency_approval_graph() -> StateGraph {
    StateGraph::builder(workflow_types::EMERGENCY_APPROVAL)
        .initial(DRAFT)
        .state(DRAFT, StateCategory::Draft)
        .state_with_timeout(PENDING_APPROVAL, StateCategory::InApproval, 24 * 60)
        .state(PENDING_EFFECTIVE, StateCategory::InApproval)
        .state(EFFECTIVE, StateCategory::Effective)
        .state(TERMINATED, StateCategory::Terminal)
        .edge(DRAFT, PENDING_APPROVAL, Role::Author)
        .edge(DRAFT, TERMINATED, Role::Author)
        .edge(PENDING_APPROVAL, PENDING_EFFECTIVE, Role::Approver)
        .edge(PENDING_APPROVAL, DRAFT, Role::Approver)
        .scheduled_edge(PENDING_EFFECTIVE, EFFECTIVE)
        .build()
        .expect("emergency approval graph is valid")
}
