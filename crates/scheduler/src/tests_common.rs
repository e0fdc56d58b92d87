use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use watershed_core::config::WatershedConfig;
use watershed_core::time::SimulatedClock;
use watershed_core::types::{
    JobDescriptor, JobId, ResourceDescriptor, ResourceKind, ResourceTopologyNode, TaskDescriptor,
    TaskId,
};
use watershed_flow::dimacs::{self, DimacsGraph};
use watershed_flow::dispatcher::SolverBackend;
use watershed_flow::error::FlowResult;

use crate::driver::FlowScheduler;
use crate::executor::{ActionLog, SimulatedExecutor};

pub fn make_machine(name: &str, pus: usize) -> ResourceTopologyNode {
    let children = (0..pus)
        .map(|i| {
            ResourceTopologyNode::new(ResourceDescriptor::new(
                ResourceKind::Pu,
                format!("{name}_pu{i}"),
            ))
        })
        .collect();
    ResourceTopologyNode::with_children(
        ResourceDescriptor::new(ResourceKind::Machine, name),
        children,
    )
}

pub fn bare_cluster_root() -> ResourceTopologyNode {
    ResourceTopologyNode::new(ResourceDescriptor::new(ResourceKind::Coordinator, "cluster"))
}

pub fn test_config(cost_model: u32) -> WatershedConfig {
    let mut config = WatershedConfig::default();
    config.scheduler.flow_scheduling_cost_model = cost_model;
    config
}

/// A scheduler wired to the in-process solver, a recording executor and a
/// simulated clock, with an empty cluster root installed.
pub fn test_scheduler(cost_model: u32) -> (FlowScheduler, ActionLog, Arc<SimulatedClock>) {
    test_scheduler_with_config(test_config(cost_model))
}

pub fn test_scheduler_with_config(
    config: WatershedConfig,
) -> (FlowScheduler, ActionLog, Arc<SimulatedClock>) {
    let (executor, actions) = SimulatedExecutor::new();
    let clock = Arc::new(SimulatedClock::new(0));
    let scheduler = FlowScheduler::new(
        config,
        bare_cluster_root(),
        Box::new(executor),
        Box::new(InlineSolver),
        clock.clone(),
    )
    .unwrap();
    (scheduler, actions, clock)
}

/// A job of `count` tasks with ids `first_task..first_task + count`.
pub fn make_job(name: &str, first_task: TaskId, count: u64) -> (JobDescriptor, Vec<TaskDescriptor>) {
    let job_id: JobId = Uuid::new_v4();
    let mut job = JobDescriptor::new(job_id, name);
    let tasks: Vec<TaskDescriptor> = (0..count)
        .map(|i| TaskDescriptor::new(first_task + i, job_id, format!("{name}/{i}"), i))
        .collect();
    job.tasks = tasks.iter().map(|td| td.id).collect();
    (job, tasks)
}

// ── In-process min-cost max-flow solver ─────────────────────────────
//
// Test support only; the product ships the graph to an external solver.
// Successive shortest augmenting paths over the parsed DIMACS graph, then a
// per-task flow walk to recover the task → PU assignment.

const KIND_UNSCHEDULED_TASK: u8 = 2;
const KIND_SCHEDULED_TASK: u8 = 3;
const KIND_ROOT_TASK: u8 = 4;
const KIND_PU: u8 = 7;

pub struct InlineSolver;

impl SolverBackend for InlineSolver {
    fn solve(&mut self, input: &str) -> FlowResult<String> {
        let graph = dimacs::parse_graph(input)?;
        Ok(solve_min_cost_flow(&graph))
    }
}

struct ResidualArc {
    to: usize,
    cap: i64,
    cost: i64,
    rev: usize,
}

fn add_edge(adj: &mut [Vec<ResidualArc>], from: usize, to: usize, cap: i64, cost: i64) {
    let rev_from = adj[to].len();
    let rev_to = adj[from].len();
    adj[from].push(ResidualArc {
        to,
        cap,
        cost,
        rev: rev_from,
    });
    adj[to].push(ResidualArc {
        to: from,
        cap: 0,
        cost: -cost,
        rev: rev_to,
    });
}

fn solve_min_cost_flow(g: &DimacsGraph) -> String {
    let ids: Vec<u64> = g.nodes.keys().copied().collect();
    let index: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let n = ids.len() + 2;
    let source = ids.len();
    let sink = ids.len() + 1;

    let mut adj: Vec<Vec<ResidualArc>> = (0..n).map(|_| Vec::new()).collect();
    for (src, dst, _lb, ub, cost) in &g.arcs {
        add_edge(&mut adj, index[src], index[dst], *ub as i64, *cost);
    }
    for node in g.nodes.values() {
        if node.supply > 0 {
            add_edge(&mut adj, source, index[&node.id], node.supply, 0);
        } else if node.supply < 0 {
            add_edge(&mut adj, index[&node.id], sink, -node.supply, 0);
        }
    }

    // Successive shortest paths (Bellman-Ford; residual costs go negative).
    loop {
        let mut dist = vec![i64::MAX; n];
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
        dist[source] = 0;
        for _ in 0..n {
            let mut changed = false;
            for u in 0..n {
                if dist[u] == i64::MAX {
                    continue;
                }
                for (ei, arc) in adj[u].iter().enumerate() {
                    if arc.cap > 0 && dist[u] + arc.cost < dist[arc.to] {
                        dist[arc.to] = dist[u] + arc.cost;
                        prev[arc.to] = Some((u, ei));
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        if dist[sink] == i64::MAX {
            break;
        }

        let mut bottleneck = i64::MAX;
        let mut v = sink;
        while let Some((u, ei)) = prev[v] {
            bottleneck = bottleneck.min(adj[u][ei].cap);
            v = u;
        }
        let mut v = sink;
        while let Some((u, ei)) = prev[v] {
            adj[u][ei].cap -= bottleneck;
            let rev = adj[u][ei].rev;
            adj[v][rev].cap += bottleneck;
            v = u;
        }
    }

    // Realized flow per (src, dst) pair: the reverse arc's gained capacity.
    let mut flows: HashMap<(usize, usize), i64> = HashMap::new();
    for (src, dst, _lb, ub, _cost) in &g.arcs {
        let u = index[src];
        let v = index[dst];
        let remaining = adj[u]
            .iter()
            .find(|arc| arc.to == v && arc.cost >= 0)
            .map(|arc| arc.cap)
            .unwrap_or(0);
        let flow = *ub as i64 - remaining;
        if flow > 0 {
            *flows.entry((u, v)).or_default() += flow;
        }
    }

    // Walk each task's unit of flow; a PU on the path is its assignment.
    let mut output = String::new();
    for node in g.nodes.values() {
        let is_task = matches!(
            node.kind_code,
            KIND_UNSCHEDULED_TASK | KIND_SCHEDULED_TASK | KIND_ROOT_TASK
        );
        if !is_task || node.supply <= 0 {
            continue;
        }
        let mut current = index[&node.id];
        loop {
            let next = (0..ids.len())
                .find(|v| flows.get(&(current, *v)).copied().unwrap_or(0) > 0);
            let Some(next) = next else {
                break;
            };
            *flows.get_mut(&(current, next)).unwrap() -= 1;
            if g.nodes[&ids[next]].kind_code == KIND_PU {
                output.push_str(&format!("m {} {}\n", node.id, ids[next]));
                break;
            }
            current = next;
        }
    }
    output.push_str("c EOA\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use watershed_flow::graph::{FlowNodeKind, GraphModel, NodeRefs};

    #[test]
    fn inline_solver_routes_a_task_to_the_cheap_pu() {
        let mut g = GraphModel::new();
        let sink = g.add_node(FlowNodeKind::Sink, NodeRefs::default());
        let task = g.add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(1));
        let cheap = g.add_node(FlowNodeKind::Pu, NodeRefs::resource(Uuid::new_v4()));
        let dear = g.add_node(FlowNodeKind::Pu, NodeRefs::resource(Uuid::new_v4()));
        g.set_supply(task, 1).unwrap();
        g.set_supply(sink, -1).unwrap();
        g.add_arc(task, cheap, 0, 1, 2, false).unwrap();
        g.add_arc(task, dear, 0, 1, 9, false).unwrap();
        g.add_arc(cheap, sink, 0, 1, 0, false).unwrap();
        g.add_arc(dear, sink, 0, 1, 0, false).unwrap();

        let mut solver = InlineSolver;
        let output = solver.solve(&dimacs::serialize_graph(&g)).unwrap();
        assert_eq!(output, format!("m {task} {cheap}\nc EOA\n"));
    }

    #[test]
    fn inline_solver_leaves_tasks_unscheduled_when_waiting_is_cheaper() {
        let mut g = GraphModel::new();
        let sink = g.add_node(FlowNodeKind::Sink, NodeRefs::default());
        let agg = g.add_node(FlowNodeKind::JobAggregate, NodeRefs::default());
        let task = g.add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(1));
        let pu = g.add_node(FlowNodeKind::Pu, NodeRefs::resource(Uuid::new_v4()));
        g.set_supply(task, 1).unwrap();
        g.set_supply(sink, -1).unwrap();
        g.add_arc(task, agg, 0, 1, 5, false).unwrap();
        g.add_arc(task, pu, 0, 1, 100, false).unwrap();
        g.add_arc(agg, sink, 0, 1, 0, false).unwrap();
        g.add_arc(pu, sink, 0, 1, 0, false).unwrap();

        let mut solver = InlineSolver;
        let output = solver.solve(&dimacs::serialize_graph(&g)).unwrap();
        assert_eq!(output, "c EOA\n");
    }

    #[test]
    fn inline_solver_spreads_tasks_over_distinct_pus() {
        let mut g = GraphModel::new();
        let sink = g.add_node(FlowNodeKind::Sink, NodeRefs::default());
        let t1 = g.add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(1));
        let t2 = g.add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(2));
        let p1 = g.add_node(FlowNodeKind::Pu, NodeRefs::resource(Uuid::new_v4()));
        let p2 = g.add_node(FlowNodeKind::Pu, NodeRefs::resource(Uuid::new_v4()));
        g.set_supply(t1, 1).unwrap();
        g.set_supply(t2, 1).unwrap();
        g.set_supply(sink, -2).unwrap();
        for t in [t1, t2] {
            for p in [p1, p2] {
                g.add_arc(t, p, 0, 1, 1, false).unwrap();
            }
        }
        g.add_arc(p1, sink, 0, 1, 0, false).unwrap();
        g.add_arc(p2, sink, 0, 1, 0, false).unwrap();

        let mut solver = InlineSolver;
        let output = solver.solve(&dimacs::serialize_graph(&g)).unwrap();
        let mappings = dimacs::parse_mappings(&output).unwrap();
        assert_eq!(mappings.len(), 2);
        let pus: std::collections::HashSet<u64> = mappings.iter().map(|(_, p)| *p).collect();
        assert_eq!(pus.len(), 2);
    }
}
