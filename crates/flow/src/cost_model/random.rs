use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};

use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{CostModel, CostModelContext};

/// Upper bound on randomly drawn placement costs.
const MAX_RANDOM_COST: Cost = 1000;
/// Preference arcs handed to each task on addition.
const NUM_PREFERENCE_ARCS: usize = 2;

/// Assigns bounded random costs. Preference arcs go to a random subset of
/// the leaf set, fixed per task at addition time so repeated graph updates
/// stay idempotent.
pub struct RandomCostModel {
    ctx: CostModelContext,
    rng: StdRng,
    preferences: std::collections::HashMap<TaskId, Vec<ResourceId>>,
}

impl RandomCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self {
            ctx,
            rng: StdRng::seed_from_u64(rand::rng().random()),
            preferences: std::collections::HashMap::new(),
        }
    }

    /// Deterministic variant for tests and repeatable simulations.
    pub fn with_seed(ctx: CostModelContext, seed: u64) -> Self {
        Self {
            ctx,
            rng: StdRng::seed_from_u64(seed),
            preferences: std::collections::HashMap::new(),
        }
    }

    /// Stable pseudo-random cost derived from the endpoints, so querying the
    /// same arc twice prices it identically.
    fn arc_cost(&self, a: u64, b: u64) -> Cost {
        let mixed = a
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            .wrapping_add(b)
            .wrapping_mul(0xbf58_476d_1ce4_e5b9);
        (mixed % (MAX_RANDOM_COST as u64)) as Cost
    }

    fn resource_key(resource: ResourceId) -> u64 {
        let bytes = resource.as_bytes();
        u64::from_le_bytes(bytes[..8].try_into().unwrap())
    }
}

impl CostModel for RandomCostModel {
    fn task_to_unscheduled_cost(&self, task: TaskId) -> Cost {
        // Waiting must stay expensive relative to any placement.
        MAX_RANDOM_COST + self.arc_cost(task, 0) % 100
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, task: TaskId, resource: ResourceId) -> Cost {
        self.arc_cost(task, Self::resource_key(resource))
    }

    fn resource_to_resource_cost(&self, src: ResourceId, dst: ResourceId) -> Cost {
        self.arc_cost(Self::resource_key(src), Self::resource_key(dst)) % 10
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

    fn task_to_equiv_class_cost(&self, task: TaskId, ec: EquivClass) -> Cost {
        self.arc_cost(task, ec)
    }

    fn equiv_class_to_resource_cost(&self, ec: EquivClass, resource: ResourceId) -> Cost {
        self.arc_cost(ec, Self::resource_key(resource))
    }

    fn equiv_class_to_equiv_class_cost(&self, src: EquivClass, dst: EquivClass) -> Cost {
        self.arc_cost(src, dst)
    }

    fn task_equiv_classes(&self, _task: TaskId) -> Vec<EquivClass> {
        Vec::new()
    }

    fn resource_equiv_classes(&self, _resource: ResourceId) -> Vec<EquivClass> {
        Vec::new()
    }

    fn task_preference_arcs(&self, task: TaskId) -> Vec<ResourceId> {
        self.preferences.get(&task).cloned().unwrap_or_default()
    }

    fn equiv_class_to_equiv_class_arcs(&self, _ec: EquivClass) -> Vec<EquivClass> {
        Vec::new()
    }

    fn add_task(&mut self, task: TaskId) {
        let leaves = self.ctx.leaf_ids.read().unwrap();
        let mut picked: Vec<ResourceId> = leaves
            .iter()
            .copied()
            .choose_multiple(&mut self.rng, NUM_PREFERENCE_ARCS);
        picked.sort();
        tracing::debug!("Task {} gets {} random preference arcs", task, picked.len());
        self.preferences.insert(task, picked);
    }

    fn remove_task(&mut self, task: TaskId) {
        self.preferences.remove(&task);
    }

    fn add_machine(&mut self, _machine: &ResourceTopologyNode) {}

    fn remove_machine(&mut self, machine: ResourceId) {
        for prefs in self.preferences.values_mut() {
            prefs.retain(|r| *r != machine);
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
