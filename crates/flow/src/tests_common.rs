use std::sync::Arc;

use watershed_core::registry::{new_job_map, new_resource_map, new_task_map};
use watershed_core::stats::new_runtime_stats;
use watershed_core::time::SimulatedClock;
use watershed_core::types::{
    JobDescriptor, JobId, ResourceDescriptor, ResourceKind, ResourceTopologyNode, TaskDescriptor,
    TaskId, TaskState,
};
use uuid::Uuid;

use crate::cost_model::{new_leaf_set, CostModelContext};

pub fn test_context() -> CostModelContext {
    CostModelContext {
        task_map: new_task_map(),
        job_map: new_job_map(),
        resource_map: new_resource_map(),
        leaf_ids: new_leaf_set(),
        runtime_stats: new_runtime_stats(),
        time: Arc::new(SimulatedClock::new(0)),
        max_arc_cost: 100_000_000,
    }
}

/// A machine subtree with the given number of PUs.
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

/// A cluster topology: one coordinator over `machines` single-PU machines.
pub fn make_cluster(machines: usize) -> ResourceTopologyNode {
    let children = (0..machines).map(|i| make_machine(&format!("m{i}"), 1)).collect();
    ResourceTopologyNode::with_children(
        ResourceDescriptor::new(ResourceKind::Coordinator, "cluster"),
        children,
    )
}

/// Registers a runnable task in the context's maps and returns its id.
pub fn register_task(ctx: &CostModelContext, job_id: JobId, task_id: TaskId) -> TaskId {
    let mut td = TaskDescriptor::new(task_id, job_id, format!("task{task_id}"), task_id);
    td.state = TaskState::Runnable;
    ctx.task_map.write().unwrap().insert(task_id, td);
    let mut jobs = ctx.job_map.write().unwrap();
    jobs.entry(job_id)
        .or_insert_with(|| JobDescriptor::new(job_id, "job"))
        .tasks
        .push(task_id);
    task_id
}

pub fn test_job_id() -> JobId {
    Uuid::new_v4()
}
