//! Validated state graphs for document workflow types.
//!
//! A graph is configuration: states, edges with the role required to walk
//! them, and per-step timeout windows. Construction validates the graph and
//! fails hard; a malformed graph is a startup error, never a runtime one.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Role, StateCategory, StateCode};

/// How an edge is walked: by a human caller, or by the scheduler sweep when
/// the gating date arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Manual,
    Scheduled,
}

/// One allowed move between states and the role required to perform it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub from: StateCode,
    pub to: StateCode,
    pub required_role: Role,
    pub trigger: TransitionTrigger,
}

/// A state declaration within one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    pub code: StateCode,
    pub category: StateCategory,
    /// Review/approval steps may time out; `None` means the state never
    /// escalates.
    pub timeout_minutes: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("workflow type {workflow_type}: initial state {state} is not declared")]
    UnknownInitialState {
        workflow_type: String,
        state: StateCode,
    },

    #[error("workflow type {workflow_type}: edge references undeclared state {state}")]
    UnknownEdgeState {
        workflow_type: String,
        state: StateCode,
    },

    #[error("workflow type {workflow_type}: terminal state {state} has an outgoing edge")]
    TerminalHasOutgoingEdge {
        workflow_type: String,
        state: StateCode,
    },

    #[error("workflow type {workflow_type}: state {state} is unreachable from {initial}")]
    UnreachableState {
        workflow_type: String,
        state: StateCode,
        initial: StateCode,
    },

    #[error("workflow type {workflow_type}: no terminal or completing state declared")]
    NoCompletingState { workflow_type: String },

    #[error("workflow type {workflow_type}: duplicate state declaration {state}")]
    DuplicateState {
        workflow_type: String,
        state: StateCode,
    },
}

/// Immutable, validated state graph for one workflow type.
#[derive(Debug, Clone)]
pub struct StateGraph {
    workflow_type: String,
    initial: StateCode,
    states: HashMap<StateCode, StateSpec>,
    /// Outgoing edges indexed by from-state.
    edges: HashMap<StateCode, Vec<TransitionEdge>>,
}

impl StateGraph {
    pub fn builder(workflow_type: impl Into<String>) -> StateGraphBuilder {
        StateGraphBuilder {
            workflow_type: workflow_type.into(),
            initial: None,
            states: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    pub fn initial_state(&self) -> &StateCode {
        &self.initial
    }

    pub fn state(&self, code: &StateCode) -> Option<&StateSpec> {
        self.states.get(code)
    }

    /// All legal outgoing edges from `from`. Empty when the state completes
    /// the workflow (or is unknown to this graph).
    pub fn allowed_transitions(&self, from: &StateCode) -> &[TransitionEdge] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A state with no outgoing edges ends the workflow instance.
    pub fn is_completing(&self, code: &StateCode) -> bool {
        self.allowed_transitions(code).is_empty()
    }

    /// Timeout window for a state, if the graph defines one.
    pub fn timeout_minutes(&self, code: &StateCode) -> Option<i64> {
        self.states.get(code).and_then(|s| s.timeout_minutes)
    }

    /// States gated on a date trigger: they have at least one scheduled
    /// outgoing edge. The sweep scans documents sitting in these.
    pub fn scheduled_states(&self) -> Vec<&StateCode> {
        self.edges
            .iter()
            .filter(|(_, edges)| {
                edges
                    .iter()
                    .any(|e| e.trigger == TransitionTrigger::Scheduled)
            })
            .map(|(code, _)| code)
            .collect()
    }

    /// The scheduled edge out of a state, if any.
    pub fn scheduled_edge(&self, from: &StateCode) -> Option<&TransitionEdge> {
        self.allowed_transitions(from)
            .iter()
            .find(|e| e.trigger == TransitionTrigger::Scheduled)
    }
}

pub struct StateGraphBuilder {
    workflow_type: String,
    initial: Option<StateCode>,
    states: Vec<StateSpec>,
    edges: Vec<TransitionEdge>,
}

impl StateGraphBuilder {
    pub fn initial(mut self, code: &str) -> Self {
        self.initial = Some(StateCode::from(code));
        self
    }

    pub fn state(mut self, code: &str, category: StateCategory) -> Self {
        self.states.push(StateSpec {
            code: StateCode::from(code),
            category,
            timeout_minutes: None,
        });
        self
    }

    pub fn state_with_timeout(
        mut self,
        code: &str,
        category: StateCategory,
        timeout_minutes: i64,
    ) -> Self {
        self.states.push(StateSpec {
            code: StateCode::from(code),
            category,
            timeout_minutes: Some(timeout_minutes),
        });
        self
    }

    pub fn edge(mut self, from: &str, to: &str, required_role: Role) -> Self {
        self.edges.push(TransitionEdge {
            from: StateCode::from(from),
            to: StateCode::from(to),
            required_role,
            trigger: TransitionTrigger::Manual,
        });
        self
    }

    pub fn scheduled_edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push(TransitionEdge {
            from: StateCode::from(from),
            to: StateCode::from(to),
            required_role: Role::System,
            trigger: TransitionTrigger::Scheduled,
        });
        self
    }

    /// Validate and seal the graph. All violations are fatal.
    pub fn build(self) -> Result<StateGraph, GraphValidationError> {
        let workflow_type = self.workflow_type;

        let mut states: HashMap<StateCode, StateSpec> = HashMap::new();
        for spec in self.states {
            if states.insert(spec.code.clone(), spec.clone()).is_some() {
                return Err(GraphValidationError::DuplicateState {
                    workflow_type,
                    state: spec.code,
                });
            }
        }

        let initial = self
            .initial
            .clone()
            .unwrap_or_else(|| StateCode::from(crate::model::states::DRAFT));
        if !states.contains_key(&initial) {
            return Err(GraphValidationError::UnknownInitialState {
                workflow_type,
                state: initial,
            });
        }

        let mut edges: HashMap<StateCode, Vec<TransitionEdge>> = HashMap::new();
        for edge in self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !states.contains_key(endpoint) {
                    return Err(GraphValidationError::UnknownEdgeState {
                        workflow_type,
                        state: endpoint.clone(),
                    });
                }
            }
            edges.entry(edge.from.clone()).or_default().push(edge);
        }

        // Terminal states must have no outgoing edges; this is also what
        // rules out cycles through a terminal state.
        for (code, spec) in &states {
            if spec.category == StateCategory::Terminal
                && edges.get(code).is_some_and(|out| !out.is_empty())
            {
                return Err(GraphValidationError::TerminalHasOutgoingEdge {
                    workflow_type,
                    state: code.clone(),
                });
            }
        }

        // Every declared state must be reachable from the initial state. An
        // unreachable terminal state means the graph can never complete the
        // way its author intended.
        let mut reachable: HashSet<&StateCode> = HashSet::new();
        let mut queue = VecDeque::from([&initial]);
        while let Some(code) = queue.pop_front() {
            if !reachable.insert(code) {
                continue;
            }
            if let Some(out) = edges.get(code) {
                for edge in out {
                    queue.push_back(&edge.to);
                }
            }
        }
        for code in states.keys() {
            if !reachable.contains(code) {
                return Err(GraphValidationError::UnreachableState {
                    workflow_type,
                    state: code.clone(),
                    initial: initial.clone(),
                });
            }
        }

        // A graph nothing can finish is a configuration bug.
        let has_completing = states
            .keys()
            .any(|code| edges.get(code).map_or(true, Vec::is_empty));
        if !has_completing {
            return Err(GraphValidationError::NoCompletingState { workflow_type });
        }

        Ok(StateGraph {
            workflow_type,
            initial,
            states,
            edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::states::*;

    fn minimal_graph() -> StateGraphBuilder {
        StateGraph::builder("test")
            .initial(DRAFT)
            .state(DRAFT, StateCategory::Draft)
            .state(PENDING_REVIEW, StateCategory::InReview)
            .state(TERMINATED, StateCategory::Terminal)
            .edge(DRAFT, PENDING_REVIEW, Role::Author)
            .edge(PENDING_REVIEW, TERMINATED, Role::QualityAdmin)
    }

    #[test]
    fn valid_graph_builds() {
        let graph = minimal_graph().build().unwrap();
        assert_eq!(graph.initial_state().as_str(), DRAFT);
        assert_eq!(
            graph.allowed_transitions(&StateCode::from(DRAFT)).len(),
            1
        );
        assert!(graph.is_completing(&StateCode::from(TERMINATED)));
    }

    #[test]
    fn terminal_state_with_outgoing_edge_is_rejected() {
        let err = minimal_graph()
            .edge(TERMINATED, DRAFT, Role::QualityAdmin)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::TerminalHasOutgoingEdge { .. }
        ));
    }

    #[test]
    fn unreachable_terminal_state_is_rejected() {
        let err = minimal_graph()
            .state(OBSOLETE, StateCategory::Terminal)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphValidationError::UnreachableState { state, .. }
            if state.as_str() == OBSOLETE));
    }

    #[test]
    fn edge_to_undeclared_state_is_rejected() {
        let err = minimal_graph()
            .edge(DRAFT, "NOT_A_STATE", Role::Author)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphValidationError::UnknownEdgeState { .. }));
    }

    #[test]
    fn unknown_initial_state_is_rejected() {
        let err = StateGraph::builder("test")
            .initial("MISSING")
            .state(DRAFT, StateCategory::Draft)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::UnknownInitialState { .. }
        ));
    }

    #[test]
    fn scheduled_edge_lookup() {
        let graph = StateGraph::builder("test")
            .initial(PENDING_EFFECTIVE)
            .state(PENDING_EFFECTIVE, StateCategory::InApproval)
            .state(EFFECTIVE, StateCategory::Effective)
            .scheduled_edge(PENDING_EFFECTIVE, EFFECTIVE)
            .build()
            .unwrap();

        let edge = graph
            .scheduled_edge(&StateCode::from(PENDING_EFFECTIVE))
            .unwrap();
        assert_eq!(edge.to.as_str(), EFFECTIVE);
        assert_eq!(edge.required_role, Role::System);
        assert_eq!(graph.scheduled_states().len(), 1);
    }
}
