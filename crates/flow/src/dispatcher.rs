use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use watershed_core::types::{ResourceId, TaskId};

use crate::delta::{DeltaKind, SchedulingDelta};
use crate::dimacs;
use crate::error::{FlowError, FlowResult};
use crate::graph::GraphModel;

/// Multimap from task node id to PU node id, in solver output order.
pub type TaskMapping = Vec<(u64, u64)>;

/// The min-cost max-flow solver boundary. The production implementation runs
/// an external binary; simulations plug in an in-process backend.
pub trait SolverBackend: Send {
    fn solve(&mut self, dimacs: &str) -> FlowResult<String>;
}

/// Launches the configured solver binary, writes the DIMACS graph to its
/// stdin and reads the assignment from its stdout.
pub struct ProcessSolver {
    path: PathBuf,
    args: Vec<String>,
}

impl ProcessSolver {
    pub fn new(path: PathBuf, args: Vec<String>) -> Self {
        Self { path, args }
    }
}

impl SolverBackend for ProcessSolver {
    fn solve(&mut self, dimacs: &str) -> FlowResult<String> {
        let mut child = Command::new(&self.path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        // Solvers consume the whole problem before emitting the assignment,
        // so a sequential write-then-read does not deadlock.
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| FlowError::Solver("solver stdin unavailable".into()))?;
            stdin.write_all(dimacs.as_bytes())?;
        }

        let mut output = String::new();
        child
            .stdout
            .take()
            .ok_or_else(|| FlowError::Solver("solver stdout unavailable".into()))?
            .read_to_string(&mut output)?;

        let status = child.wait()?;
        if !status.success() {
            return Err(FlowError::Solver(format!(
                "solver {} exited with {status}",
                self.path.display()
            )));
        }
        Ok(output)
    }
}

/// Serializes the graph, invokes the solver and parses the task → PU
/// mapping. Keeps a monotonic invocation count the driver uses to trigger
/// one-time initial work.
pub struct SolverDispatcher {
    backend: Box<dyn SolverBackend>,
    seq_num: u64,
}

impl SolverDispatcher {
    pub fn new(backend: Box<dyn SolverBackend>) -> Self {
        Self {
            backend,
            seq_num: 0,
        }
    }

    /// Number of completed solver invocations.
    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn run(&mut self, graph: &GraphModel) -> FlowResult<TaskMapping> {
        let input = dimacs::serialize_graph(graph);
        debug!(
            "Dispatching graph to solver: {} nodes, {} arcs",
            graph.num_nodes(),
            graph.num_arcs()
        );
        let output = self.backend.solve(&input)?;
        let mappings = dimacs::parse_mappings(&output)?;
        self.seq_num += 1;
        debug!("Solver run {} produced {} bindings", self.seq_num, mappings.len());
        Ok(mappings)
    }

    /// Classifies a (task, PU) binding against the current bindings map.
    ///
    /// A task occupying the target resource is preempted first; the binding
    /// itself becomes Place (previously unbound), NoOp (unchanged) or
    /// Migrate (bound elsewhere).
    pub fn node_binding_to_scheduling_delta(
        &self,
        task: TaskId,
        resource: ResourceId,
        bindings: &HashMap<TaskId, ResourceId>,
        deltas: &mut Vec<SchedulingDelta>,
    ) {
        if let Some((occupant, _)) = bindings
            .iter()
            .find(|(other, bound)| **other != task && **bound == resource)
        {
            warn!("Task {} displaces running task {} on {}", task, occupant, resource);
            deltas.push(SchedulingDelta::new(DeltaKind::Preempt {
                task: *occupant,
                resource,
            }));
        }

        match bindings.get(&task) {
            Some(bound) if *bound == resource => {
                deltas.push(SchedulingDelta::new(DeltaKind::NoOp));
            }
            Some(bound) => {
                deltas.push(SchedulingDelta::new(DeltaKind::Migrate {
                    task,
                    from: *bound,
                    to: resource,
                }));
            }
            None => {
                deltas.push(SchedulingDelta::new(DeltaKind::Place { task, resource }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FlowNodeKind, NodeRefs};
    use uuid::Uuid;

    struct CannedSolver {
        output: String,
        inputs: Vec<String>,
    }

    impl SolverBackend for CannedSolver {
        fn solve(&mut self, dimacs: &str) -> FlowResult<String> {
            self.inputs.push(dimacs.to_string());
            Ok(self.output.clone())
        }
    }

    fn dispatcher_with(output: &str) -> SolverDispatcher {
        SolverDispatcher::new(Box::new(CannedSolver {
            output: output.to_string(),
            inputs: Vec::new(),
        }))
    }

    #[test]
    fn run_parses_mappings_and_counts_invocations() {
        let mut graph = GraphModel::new();
        let task = graph.add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(1));
        let pu = graph.add_node(FlowNodeKind::Pu, NodeRefs::default());
        graph.add_arc(task, pu, 0, 1, 0, false).unwrap();

        let mut dispatcher = dispatcher_with("m 1 2\nc EOA\n");
        assert_eq!(dispatcher.seq_num(), 0);
        let mapping = dispatcher.run(&graph).unwrap();
        assert_eq!(mapping, vec![(1, 2)]);
        assert_eq!(dispatcher.seq_num(), 1);
        dispatcher.run(&graph).unwrap();
        assert_eq!(dispatcher.seq_num(), 2);
    }

    #[test]
    fn unbound_task_becomes_place() {
        let dispatcher = dispatcher_with("");
        let bindings = HashMap::new();
        let mut deltas = Vec::new();
        let resource = Uuid::new_v4();
        dispatcher.node_binding_to_scheduling_delta(1, resource, &bindings, &mut deltas);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].kind, DeltaKind::Place { task: 1, resource });
    }

    #[test]
    fn unchanged_binding_becomes_noop() {
        let dispatcher = dispatcher_with("");
        let resource = Uuid::new_v4();
        let bindings = HashMap::from([(1u64, resource)]);
        let mut deltas = Vec::new();
        dispatcher.node_binding_to_scheduling_delta(1, resource, &bindings, &mut deltas);
        assert_eq!(deltas[0].kind, DeltaKind::NoOp);
    }

    #[test]
    fn moved_binding_becomes_migrate() {
        let dispatcher = dispatcher_with("");
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let bindings = HashMap::from([(1u64, old)]);
        let mut deltas = Vec::new();
        dispatcher.node_binding_to_scheduling_delta(1, new, &bindings, &mut deltas);
        assert_eq!(
            deltas[0].kind,
            DeltaKind::Migrate {
                task: 1,
                from: old,
                to: new
            }
        );
    }

    #[test]
    fn occupied_target_preempts_the_occupant_first() {
        let dispatcher = dispatcher_with("");
        let resource = Uuid::new_v4();
        let bindings = HashMap::from([(9u64, resource)]);
        let mut deltas = Vec::new();
        dispatcher.node_binding_to_scheduling_delta(1, resource, &bindings, &mut deltas);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].kind, DeltaKind::Preempt { task: 9, resource });
        assert_eq!(deltas[1].kind, DeltaKind::Place { task: 1, resource });
    }
}
