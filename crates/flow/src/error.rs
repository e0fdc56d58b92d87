use thiserror::Error;

use watershed_core::types::{ResourceId, TaskId};

/// Errors that can occur while maintaining or solving the flow network.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unknown flow node: {0}")]
    UnknownNode(u64),

    #[error("unknown flow arc: {0}")]
    UnknownArc(u64),

    #[error("arc already exists between {0} and {1}")]
    DuplicateArc(u64, u64),

    #[error("resource {0} is not in the flow graph")]
    UnknownResource(ResourceId),

    #[error("no feasible placement for task {0}")]
    InfeasibleSchedule(TaskId),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("solver IO error: {0}")]
    SolverIo(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type FlowResult<T> = Result<T, FlowError>;
