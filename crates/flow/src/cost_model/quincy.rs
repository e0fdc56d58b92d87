use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{CostModel, CostModelContext};

/// Cost of routing a task through the cluster aggregator (no locality data).
const CLUSTER_AGG_COST: Cost = 100;
/// Initial cost of staying unscheduled.
const WAIT_BASE_COST: Cost = 5;
/// Unscheduled cost increase per second of waiting; bounds task wait time by
/// eventually overtaking any placement cost.
const WAIT_COST_PER_SEC: Cost = 10;
/// Extra charge for killing a running task.
const PREEMPTION_PENALTY: Cost = 50;

/// Quincy cost semantics without an object store: the unscheduled penalty
/// grows with wait time until placement wins, and a running task is free to
/// keep its slot but expensive to displace.
pub struct QuincyCostModel {
    ctx: CostModelContext,
}

impl QuincyCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self { ctx }
    }

    fn wait_time_us(&self, task: TaskId) -> u64 {
        let tasks = self.ctx.task_map.read().unwrap();
        match tasks.get(&task) {
            Some(td) => self.ctx.time.now_us().saturating_sub(td.submit_time_us),
            None => 0,
        }
    }
}

impl CostModel for QuincyCostModel {
    fn task_to_unscheduled_cost(&self, task: TaskId) -> Cost {
        let wait_secs = (self.wait_time_us(task) / 1_000_000) as Cost;
        (WAIT_BASE_COST + wait_secs * WAIT_COST_PER_SEC).min(self.ctx.max_arc_cost)
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

    fn task_preemption_cost(&self, task: TaskId) -> Cost {
        (self.task_to_unscheduled_cost(task) + PREEMPTION_PENALTY).min(self.ctx.max_arc_cost)
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

    fn debug_info_csv(&self) -> String {
        let tasks = self.ctx.task_map.read().unwrap();
        let mut rows = String::from("task_id,wait_us,unscheduled_cost\n");
        let mut ids: Vec<TaskId> = tasks.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let wait = self.wait_time_us(id);
            rows.push_str(&format!("{},{},{}\n", id, wait, self.task_to_unscheduled_cost(id)));
        }
        rows
    }

    fn name(&self) -> &'static str {
        "quincy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::{register_task, test_context, test_job_id};
    use std::sync::Arc;
    use watershed_core::time::SimulatedClock;

    fn model_with_clock() -> (QuincyCostModel, Arc<SimulatedClock>) {
        let clock = Arc::new(SimulatedClock::new(0));
        let ctx = CostModelContext {
            time: clock.clone(),
            ..test_context()
        };
        let job = test_job_id();
        register_task(&ctx, job, 1);
        (QuincyCostModel::new(ctx), clock)
    }

    #[test]
    fn fresh_task_prefers_waiting_over_expensive_placement() {
        let (model, _clock) = model_with_clock();
        assert!(model.task_to_unscheduled_cost(1) < model.task_to_resource_cost(1, uuid::Uuid::new_v4()));
    }

    #[test]
    fn wait_cost_eventually_overtakes_placement() {
        let (model, clock) = model_with_clock();
        clock.advance(60_000_000); // a minute of waiting
        assert!(model.task_to_unscheduled_cost(1) > CLUSTER_AGG_COST);
    }

    #[test]
    fn unscheduled_cost_is_capped() {
        let (model, clock) = model_with_clock();
        clock.advance(u64::MAX / 2);
        assert!(model.task_to_unscheduled_cost(1) <= 100_000_000);
    }

    #[test]
    fn preemption_costs_more_than_waiting() {
        let (model, _clock) = model_with_clock();
        assert!(model.task_preemption_cost(1) > model.task_to_unscheduled_cost(1));
    }

    #[test]
    fn debug_csv_lists_tasks() {
        let (model, _clock) = model_with_clock();
        let csv = model.debug_info_csv();
        assert!(csv.starts_with("task_id,wait_us,unscheduled_cost\n"));
        assert!(csv.lines().count() >= 2);
    }
}
