use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{stable_hash, CostModel, CostModelContext};

/// Assumed runtime (ms) for classes with no samples yet.
const DEFAULT_RUNTIME_MS: Cost = 100;
/// Base cost of staying unscheduled for a round.
const WAIT_BASE_COST: Cost = 1000;
/// Wait time is charged per this many microseconds.
const WAIT_COST_GRANULARITY_US: u64 = 100_000;

/// Shortest-job-first: placement arcs are priced by the expected runtime of
/// the task's equivalence class, so shorter tasks drain first. Expected
/// runtimes come from the shared runtime statistics.
pub struct SjfCostModel {
    ctx: CostModelContext,
}

impl SjfCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self { ctx }
    }

    /// One equivalence class per task binary, derived from the task name.
    fn class_of(&self, task: TaskId) -> EquivClass {
        let tasks = self.ctx.task_map.read().unwrap();
        match tasks.get(&task) {
            Some(td) => stable_hash(td.name.as_bytes()),
            None => stable_hash(&task.to_le_bytes()),
        }
    }

    fn expected_runtime_ms(&self, ec: EquivClass) -> Cost {
        let stats = self.ctx.runtime_stats.read().unwrap();
        stats
            .average_runtime_us(ec)
            .map(|us| (us / 1000).max(1) as Cost)
            .unwrap_or(DEFAULT_RUNTIME_MS)
    }

    fn wait_time_us(&self, task: TaskId) -> u64 {
        let tasks = self.ctx.task_map.read().unwrap();
        match tasks.get(&task) {
            Some(td) => self.ctx.time.now_us().saturating_sub(td.submit_time_us),
            None => 0,
        }
    }
}

impl CostModel for SjfCostModel {
    fn task_to_unscheduled_cost(&self, task: TaskId) -> Cost {
        let waited = (self.wait_time_us(task) / WAIT_COST_GRANULARITY_US) as Cost;
        (WAIT_BASE_COST + waited).min(self.ctx.max_arc_cost)
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, task: TaskId, _resource: ResourceId) -> Cost {
        self.expected_runtime_ms(self.class_of(task))
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
        self.task_to_unscheduled_cost(task)
    }

    fn task_to_equiv_class_cost(&self, _task: TaskId, _ec: EquivClass) -> Cost {
        0
    }

    fn equiv_class_to_resource_cost(&self, ec: EquivClass, _resource: ResourceId) -> Cost {
        self.expected_runtime_ms(ec)
    }

    fn equiv_class_to_equiv_class_cost(&self, _src: EquivClass, _dst: EquivClass) -> Cost {
        0
    }

    fn task_equiv_classes(&self, task: TaskId) -> Vec<EquivClass> {
        vec![self.class_of(task)]
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
        "sjf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::{register_task, test_context, test_job_id};
    use uuid::Uuid;

    #[test]
    fn tasks_with_the_same_name_share_a_class() {
        let ctx = test_context();
        let job = test_job_id();
        register_task(&ctx, job, 1);
        register_task(&ctx, job, 2);
        {
            let mut tasks = ctx.task_map.write().unwrap();
            tasks.get_mut(&1).unwrap().name = "wordcount".into();
            tasks.get_mut(&2).unwrap().name = "wordcount".into();
        }
        let model = SjfCostModel::new(ctx);
        assert_eq!(model.task_equiv_classes(1), model.task_equiv_classes(2));
    }

    #[test]
    fn shorter_classes_cost_less() {
        let ctx = test_context();
        let job = test_job_id();
        register_task(&ctx, job, 1);
        let ec = {
            let tasks = ctx.task_map.read().unwrap();
            stable_hash(tasks[&1].name.as_bytes())
        };
        ctx.runtime_stats
            .write()
            .unwrap()
            .process_task_final_report(&[ec], 10_000); // 10ms average

        let model = SjfCostModel::new(ctx);
        let short_cost = model.equiv_class_to_resource_cost(ec, Uuid::new_v4());
        let unknown_cost = model.equiv_class_to_resource_cost(ec + 1, Uuid::new_v4());
        assert!(short_cost < unknown_cost);
        assert_eq!(short_cost, 10);
        assert_eq!(unknown_cost, DEFAULT_RUNTIME_MS);
    }

    #[test]
    fn unscheduled_cost_rises_with_wait() {
        let ctx = test_context();
        let clock = std::sync::Arc::new(watershed_core::time::SimulatedClock::new(0));
        let ctx = CostModelContext {
            time: clock.clone(),
            ..ctx
        };
        let job = test_job_id();
        register_task(&ctx, job, 1);

        let model = SjfCostModel::new(ctx);
        let fresh = model.task_to_unscheduled_cost(1);
        clock.advance(2_000_000);
        let waited = model.task_to_unscheduled_cost(1);
        assert!(waited > fresh);
    }
}
