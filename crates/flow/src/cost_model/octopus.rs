use std::collections::HashMap;

use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{CostModel, CostModelContext};
use crate::graph::{FlowNode, FlowNodeKind};

/// Cost added per task already running below a resource.
const LOAD_FACTOR: Cost = 10;
/// Waiting is always worse than the most loaded subtree.
const UNSCHEDULED_COST: Cost = 10_000;

/// Pure load balancing: routing toward a subtree costs proportionally to the
/// number of tasks already running there. Subtree counts are rebuilt from the
/// topology-statistics passes around each scheduling iteration.
pub struct OctopusCostModel {
    ctx: CostModelContext,
    /// Tasks running at or below each topology resource.
    running: HashMap<ResourceId, u64>,
}

impl OctopusCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self {
            ctx,
            running: HashMap::new(),
        }
    }

    fn load(&self, resource: ResourceId) -> u64 {
        self.running.get(&resource).copied().unwrap_or(0)
    }
}

impl CostModel for OctopusCostModel {
    fn task_to_unscheduled_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST.min(self.ctx.max_arc_cost)
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, _task: TaskId, resource: ResourceId) -> Cost {
        self.load(resource) as Cost * LOAD_FACTOR
    }

    fn resource_to_resource_cost(&self, _src: ResourceId, dst: ResourceId) -> Cost {
        self.load(dst) as Cost * LOAD_FACTOR
    }

    fn leaf_to_sink_cost(&self, _resource: ResourceId) -> Cost {
        0
    }

    fn task_continuation_cost(&self, _task: TaskId) -> Cost {
        0
    }

    fn task_preemption_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST.min(self.ctx.max_arc_cost)
    }

    fn task_to_equiv_class_cost(&self, _task: TaskId, _ec: EquivClass) -> Cost {
        0
    }

    fn equiv_class_to_resource_cost(&self, _ec: EquivClass, _resource: ResourceId) -> Cost {
        0
    }

    fn equiv_class_to_equiv_class_cost(&self, _src: EquivClass, _dst: EquivClass) -> Cost {
        0
    }

    fn task_equiv_classes(&self, _task: TaskId) -> Vec<EquivClass> {
        Vec::new()
    }

    fn resource_equiv_classes(&self, _resource: ResourceId) -> Vec<EquivClass> {
        Vec::new()
    }

    fn task_preference_arcs(&self, _task: TaskId) -> Vec<ResourceId> {
        Vec::new()
    }

    fn equiv_class_to_equiv_class_arcs(&self, _ec: EquivClass) -> Vec<EquivClass> {
        Vec::new()
    }

    fn add_task(&mut self, _task: TaskId) {}

    fn remove_task(&mut self, _task: TaskId) {}

    fn add_machine(&mut self, _machine: &ResourceTopologyNode) {}

    fn remove_machine(&mut self, machine: ResourceId) {
        self.running.remove(&machine);
    }

    fn uses_topology_stats(&self) -> bool {
        true
    }

    fn prepare_stats(&mut self, node: &FlowNode) {
        if let Some(resource) = node.resource {
            if node.kind.is_topology() {
                self.running.insert(resource, 0);
            }
        }
    }

    fn gather_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        // Leaf facts: a scheduled task's single outgoing arc marks its PU busy.
        if parent.kind == FlowNodeKind::ScheduledTask && child.kind == FlowNodeKind::Pu {
            if let Some(resource) = child.resource {
                *self.running.entry(resource).or_default() += 1;
            }
        }
    }

    fn update_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        // Propagation: roll counts up the topology tree.
        if !child.kind.is_topology() || !parent.kind.is_topology() {
            return;
        }
        if let (Some(child_res), Some(parent_res)) = (child.resource, parent.resource) {
            let below = self.load(child_res);
            *self.running.entry(parent_res).or_default() += below;
        }
    }

    fn debug_info_csv(&self) -> String {
        let mut rows = String::from("resource_id,running_tasks\n");
        let mut entries: Vec<(&ResourceId, &u64)> = self.running.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        for (id, count) in entries {
            rows.push_str(&format!("{id},{count}\n"));
        }
        rows
    }

    fn name(&self) -> &'static str {
        "octopus"
    }
}
