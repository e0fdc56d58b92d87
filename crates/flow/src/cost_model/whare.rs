use std::collections::HashMap;

use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{stable_hash, CostModel, CostModelContext};
use crate::graph::{FlowNode, FlowNodeKind};

/// Assumed runtime (ms) on a machine class with no samples yet.
const DEFAULT_RUNTIME_MS: Cost = 100;
/// Waiting must remain worse than the slowest machine class.
const UNSCHEDULED_COST: Cost = 50_000;

/// Whare-Map style model: every machine forms its own equivalence class, and
/// a task's placement on a class is priced by the runtimes previously
/// observed there, scaled by the machines's current load.
pub struct WhareCostModel {
    ctx: CostModelContext,
    /// machine resource → its equivalence class.
    machine_classes: HashMap<ResourceId, EquivClass>,
    /// equivalence class → machine resource (reverse of the above).
    class_machines: HashMap<EquivClass, ResourceId>,
    /// Busy PUs at or below each topology resource, rebuilt per iteration.
    busy: HashMap<ResourceId, u64>,
}

impl WhareCostModel {
    pub fn new(ctx: CostModelContext) -> Self {
        Self {
            ctx,
            machine_classes: HashMap::new(),
            class_machines: HashMap::new(),
            busy: HashMap::new(),
        }
    }

    fn class_for_machine(machine: ResourceId) -> EquivClass {
        stable_hash(machine.as_bytes())
    }

    fn observed_runtime_ms(&self, ec: EquivClass) -> Cost {
        let stats = self.ctx.runtime_stats.read().unwrap();
        stats
            .average_runtime_us(ec)
            .map(|us| (us / 1000).max(1) as Cost)
            .unwrap_or(DEFAULT_RUNTIME_MS)
    }

    fn machine_load(&self, ec: EquivClass) -> u64 {
        self.class_machines
            .get(&ec)
            .and_then(|machine| self.busy.get(machine))
            .copied()
            .unwrap_or(0)
    }
}

impl CostModel for WhareCostModel {
    fn task_to_unscheduled_cost(&self, _task: TaskId) -> Cost {
        UNSCHEDULED_COST.min(self.ctx.max_arc_cost)
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, _task: TaskId, _resource: ResourceId) -> Cost {
        // Fallback through the cluster aggregator: assume the worst class.
        DEFAULT_RUNTIME_MS * 2
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
        UNSCHEDULED_COST.min(self.ctx.max_arc_cost)
    }

    fn task_to_equiv_class_cost(&self, _task: TaskId, ec: EquivClass) -> Cost {
        let load = self.machine_load(ec) as Cost;
        self.observed_runtime_ms(ec) * (1 + load)
    }

    fn equiv_class_to_resource_cost(&self, _ec: EquivClass, _resource: ResourceId) -> Cost {
        0
    }

    fn equiv_class_to_equiv_class_cost(&self, _src: EquivClass, _dst: EquivClass) -> Cost {
        0
    }

    fn task_equiv_classes(&self, _task: TaskId) -> Vec<EquivClass> {
        // Tasks may route through any machine class; score each separately.
        let mut classes: Vec<EquivClass> = self.machine_classes.values().copied().collect();
        classes.sort_unstable();
        classes
    }

    fn resource_equiv_classes(&self, resource: ResourceId) -> Vec<EquivClass> {
        self.machine_classes
            .get(&resource)
            .map(|ec| vec![*ec])
            .unwrap_or_default()
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
        let id = machine.descriptor.id;
        let ec = Self::class_for_machine(id);
        self.machine_classes.insert(id, ec);
        self.class_machines.insert(ec, id);
        tracing::debug!("Machine {} joins Whare class {}", id, ec);
    }

    fn remove_machine(&mut self, machine: ResourceId) {
        if let Some(ec) = self.machine_classes.remove(&machine) {
            self.class_machines.remove(&ec);
        }
        self.busy.remove(&machine);
    }

    fn uses_topology_stats(&self) -> bool {
        true
    }

    fn prepare_stats(&mut self, node: &FlowNode) {
        if let Some(resource) = node.resource {
            if node.kind.is_topology() {
                self.busy.insert(resource, 0);
            }
        }
    }

    fn gather_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        if parent.kind == FlowNodeKind::ScheduledTask && child.kind == FlowNodeKind::Pu {
            if let Some(resource) = child.resource {
                *self.busy.entry(resource).or_default() += 1;
            }
        }
    }

    fn update_stats(&mut self, child: &FlowNode, parent: &FlowNode) {
        if !child.kind.is_topology() || !parent.kind.is_topology() {
            return;
        }
        if let (Some(child_res), Some(parent_res)) = (child.resource, parent.resource) {
            let below = self.busy.get(&child_res).copied().unwrap_or(0);
            *self.busy.entry(parent_res).or_default() += below;
        }
    }

    fn name(&self) -> &'static str {
        "whare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::{make_machine, test_context};

    #[test]
    fn each_machine_forms_a_class() {
        let mut model = WhareCostModel::new(test_context());
        let m0 = make_machine("m0", 2);
        let m1 = make_machine("m1", 2);
        model.add_machine(&m0);
        model.add_machine(&m1);

        assert_eq!(model.task_equiv_classes(1).len(), 2);
        let ec0 = model.resource_equiv_classes(m0.descriptor.id);
        assert_eq!(ec0.len(), 1);
        assert_ne!(ec0, model.resource_equiv_classes(m1.descriptor.id));

        model.remove_machine(m0.descriptor.id);
        assert!(model.resource_equiv_classes(m0.descriptor.id).is_empty());
        assert_eq!(model.task_equiv_classes(1).len(), 1);
    }

    #[test]
    fn observed_runtimes_price_machine_classes() {
        let ctx = test_context();
        let mut model = WhareCostModel::new(ctx.clone());
        let fast = make_machine("fast", 1);
        let slow = make_machine("slow", 1);
        model.add_machine(&fast);
        model.add_machine(&slow);

        let fast_ec = model.resource_equiv_classes(fast.descriptor.id)[0];
        let slow_ec = model.resource_equiv_classes(slow.descriptor.id)[0];
        {
            let mut stats = ctx.runtime_stats.write().unwrap();
            stats.process_task_final_report(&[fast_ec], 10_000);
            stats.process_task_final_report(&[slow_ec], 500_000);
        }

        assert!(model.task_to_equiv_class_cost(1, fast_ec) < model.task_to_equiv_class_cost(1, slow_ec));
    }

    #[test]
    fn load_scales_class_cost() {
        let ctx = test_context();
        let mut model = WhareCostModel::new(ctx);
        let machine = make_machine("m0", 1);
        model.add_machine(&machine);
        let ec = model.resource_equiv_classes(machine.descriptor.id)[0];

        let idle_cost = model.task_to_equiv_class_cost(1, ec);
        model.busy.insert(machine.descriptor.id, 2);
        let busy_cost = model.task_to_equiv_class_cost(1, ec);
        assert_eq!(busy_cost, idle_cost * 3);
    }
}
