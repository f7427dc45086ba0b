pub mod graph;
pub mod names;
pub mod registry;

pub use graph::{
    GraphValidationError, StateGraph, StateGraphBuilder, StateSpec, TransitionEdge,
    TransitionTrigger,
};
pub use names::DisplayNames;
pub use registry::{workflow_types, StateGraphRegistry};
