//! watershed-flow — the min-cost-flow scheduling core.
//!
//! Cluster topology and job churn are maintained as a flow network
//! (`flow_graph`), priced by a pluggable cost model (`cost_model`), shipped
//! to an external solver in DIMACS form (`dimacs`, `dispatcher`) and turned
//! back into scheduling deltas (`delta`).

pub mod cost_model;
pub mod delta;
pub mod dfs;
pub mod dimacs;
pub mod dispatcher;
pub mod error;
pub mod flow_graph;
pub mod graph;

#[cfg(test)]
pub(crate) mod tests_common;

pub use delta::{DeltaKind, SchedulingDelta};
pub use dispatcher::{ProcessSolver, SolverBackend, SolverDispatcher, TaskMapping};
pub use error::{FlowError, FlowResult};
pub use flow_graph::FlowGraph;
pub use graph::{FlowNode, FlowNodeId, FlowNodeKind, GraphChangeStats, GraphModel, NodeRefs};
