use std::collections::HashMap;

use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{CostModel, CostModelContext};
use crate::graph::{FlowNode, FlowNodeKind};

/// Per-task interference charge, scaled by co-located task count.
const INTERFERENCE_COST: Cost = 25;
/// Charge for entering a machine with no free PU.
const SATURATION_COST: Cost = 20_000;
/// Waiting must stay worse than any interference penalty short of saturation.
const UNSCHEDULED_COST: Cost = 30_000;

/// Co-location aware model: placing a task on a machine costs quadratically
/// in the number of tasks already running there, and saturated machines are
/// priced out entirely. Occupancy and capacity come from the topology
/// statistics passes and machine registration.
pub struct CocoCostModel {
    ctx: CostModelContext,
    /// PU slots per machine resource.
    capacity: HashMap<ResourceId, u64>,
    /// Tasks running at or below each topology resource.
    occupancy: HashMap<ResourceId, u64>,
}

impl CocoCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self {
            ctx,
            capacity: HashMap::new(),
            occupancy: HashMap::new(),
        }
    }

    fn interference(&self, resource: ResourceId) -> Cost {
        let running = self.occupancy.get(&resource).copied().unwrap_or(0);
        let slots = self.capacity.get(&resource).copied().unwrap_or(0);
        if slots > 0 && running >= slots {
            return SATURATION_COST;
        }
        let running = running as Cost;
        running * running * INTERFERENCE_COST
    }
}

impl CostModel for CocoCostModel {
    fn task_to_unscheduled_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST.min(self.ctx.max_arc_cost)
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, _task: TaskId, resource: ResourceId) -> Cost {
        self.interference(resource)
    }

    fn resource_to_resource_cost(&self, _src: ResourceId, dst: ResourceId) -> Cost {
        self.interference(dst)
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

    fn add_machine(&mut self, machine: &ResourceTopologyNode) {
        self.capacity.insert(machine.descriptor.id, machine.num_leaves());
    }

    fn remove_machine(&mut self, machine: ResourceId) {
        self.capacity.remove(&machine);
        self.occupancy.remove(&machine);
    }

    fn uses_topology_stats(&self) -> bool {
        true
    }

    fn prepare_stats(&mut self, node: &FlowNode) {
        if let Some(resource) = node.resource {
            if node.kind.is_topology() {
                self.occupancy.insert(resource, 0);
            }
        }
    }

    fn gather_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        if parent.kind == FlowNodeKind::ScheduledTask && child.kind == FlowNodeKind::Pu {
            if let Some(resource) = child.resource {
                *self.occupancy.entry(resource).or_default() += 1;
            }
        }
    }

    fn update_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        if !child.kind.is_topology() || !parent.kind.is_topology() {
            return;
        }
        if let (Some(child_res), Some(parent_res)) = (child.resource, parent.resource) {
            let below = self.occupancy.get(&child_res).copied().unwrap_or(0);
            *self.occupancy.entry(parent_res).or_default() += below;
        }
    }

    fn name(&self) -> &'static str {
        "coco"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::{make_machine, test_context};
    use uuid::Uuid;

    #[test]
    fn interference_grows_quadratically() {
        let mut model = CocoCostModel::new(test_context());
        let machine = make_machine("m0", 4);
        let id = machine.descriptor.id;
        model.add_machine(&machine);

        assert_eq!(model.resource_to_resource_cost(Uuid::new_v4(), id), 0);
        model.occupancy.insert(id, 1);
        assert_eq!(model.resource_to_resource_cost(Uuid::new_v4(), id), INTERFERENCE_COST);
        model.occupancy.insert(id, 3);
        assert_eq!(
            model.resource_to_resource_cost(Uuid::new_v4(), id),
            9 * INTERFERENCE_COST
        );
    }

    #[test]
    fn saturated_machines_are_priced_out() {
        let mut model = CocoCostModel::new(test_context());
        let machine = make_machine("m0", 2);
        let id = machine.descriptor.id;
        model.add_machine(&machine);

        model.occupancy.insert(id, 2);
        assert_eq!(model.resource_to_resource_cost(Uuid::new_v4(), id), SATURATION_COST);
    }

    #[test]
    fn removed_machine_forgets_state() {
        let mut model = CocoCostModel::new(test_context());
        let machine = make_machine("m0", 2);
        let id = machine.descriptor.id;
        model.add_machine(&machine);
        model.occupancy.insert(id, 2);
        model.remove_machine(id);
        assert_eq!(model.resource_to_resource_cost(Uuid::new_v4(), id), 0);
    }
}
