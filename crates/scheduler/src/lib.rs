//! watershed-scheduler — the scheduling driver.
//!
//! Couples the flow graph, the solver dispatcher and the executor: cluster
//! and job events mutate the graph, a scheduling iteration runs the solver,
//! and the resulting deltas are applied to the cluster.

pub mod driver;
pub mod executor;

#[cfg(test)]
pub(crate) mod tests_common;

pub use driver::FlowScheduler;
pub use executor::{Executor, ExecutorAction, KillReason, SimulatedExecutor};
