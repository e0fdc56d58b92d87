use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::CostModel;

/// Cost of leaving a task unscheduled for a round.
const UNSCHEDULED_COST: Cost = 5;
/// Cost of the fallback arc through the cluster aggregator.
const CLUSTER_AGG_COST: Cost = 2;

/// Fixed-cost model: every placement is equally good, but scheduling always
/// beats waiting. No equivalence classes, no preferences.
pub struct TrivialCostModel;

impl TrivialCostModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrivialCostModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CostModel for TrivialCostModel {
    fn task_to_unscheduled_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, _task: TaskId, _resource: ResourceId) -> Cost {
        CLUSTER_AGG_COST
    }

    fn resource_to_resource_cost(&self, _src: ResourceId, _dst: ResourceId) -> Cost {
        0
    }

    fn leaf_to_sink_cost(&self, _resource: ResourceId) -> Cost {
        0
    }

    fn task_continuation_cost(&self, _task: TaskId) -> Cost {
        0
    }

    fn task_preemption_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST
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

    fn remove_machine(&mut self, _machine: ResourceId) {}

    fn name(&self) -> &'static str {
        "trivial"
    }
}
