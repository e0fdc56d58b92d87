use std::collections::{HashMap, HashSet};

use watershed_core::config::SimulatedQuincyConfig;
use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::cost_model::{CostModel, CostModelContext};
use crate::dfs::{FileId, NumBlocks, SimulatedDfs};

/// Initial cost of staying unscheduled.
const WAIT_BASE_COST: Cost = 5;
/// Unscheduled cost increase per second of waiting.
const WAIT_COST_PER_SEC: Cost = 10;

/// The Quincy data-locality model over a simulated distributed filesystem.
///
/// On task addition a file set is sampled from the DFS; block frequencies per
/// machine and rack decide which machines get direct preference arcs and
/// which racks become the task's equivalence classes. Costs charge
/// cross-rack transfers at `core_transfer_cost` and intra-rack transfers at
/// `tor_transfer_cost` per block.
pub struct SimulatedQuincyCostModel {
    ctx: CostModelContext,
    config: SimulatedQuincyConfig,
    dfs: SimulatedDfs,
    machine_to_rack: HashMap<ResourceId, EquivClass>,
    rack_to_machines: HashMap<EquivClass, Vec<ResourceId>>,
    next_rack: EquivClass,
    file_sets: HashMap<TaskId, HashSet<FileId>>,
    preferred_machines: HashMap<TaskId, HashMap<ResourceId, Cost>>,
    preferred_racks: HashMap<TaskId, HashMap<EquivClass, Cost>>,
    cluster_costs: HashMap<TaskId, Cost>,
}

impl SimulatedQuincyCostModel {
    pub fn new(ctx: CostModelContext, config: SimulatedQuincyConfig) -> Self {
        let dfs = SimulatedDfs::new(&config);
        Self::with_dfs(ctx, config, dfs)
    }

    /// Construction with an externally populated DFS, for simulations that
    /// need exact block placements.
    pub fn with_dfs(ctx: CostModelContext, config: SimulatedQuincyConfig, dfs: SimulatedDfs) -> Self {
        Self {
            ctx,
            config,
            dfs,
            machine_to_rack: HashMap::new(),
            rack_to_machines: HashMap::new(),
            next_rack: 1,
            file_sets: HashMap::new(),
            preferred_machines: HashMap::new(),
            preferred_racks: HashMap::new(),
            cluster_costs: HashMap::new(),
        }
    }

    pub fn dfs_mut(&mut self) -> &mut SimulatedDfs {
        &mut self.dfs
    }

    /// Every task pays at least the full-remote price until its file set says
    /// otherwise.
    fn default_cost(&self) -> Cost {
        self.config.mean_input_blocks as Cost * self.config.core_transfer_cost
    }

    fn wait_time_us(&self, task: TaskId) -> u64 {
        let tasks = self.ctx.task_map.read().unwrap();
        match tasks.get(&task) {
            Some(td) => self.ctx.time.now_us().saturating_sub(td.submit_time_us),
            None => 0,
        }
    }

    /// Assigns the machine to the most recently opened rack, or opens a new
    /// one once `machines_per_rack` is reached.
    fn assign_rack(&mut self, machine: ResourceId) -> EquivClass {
        let current = self.next_rack;
        let open_slot = self
            .rack_to_machines
            .get(&current)
            .map(|ms| (ms.len() as u64) < self.config.machines_per_rack)
            .unwrap_or(true);
        let rack = if open_slot {
            current
        } else {
            self.next_rack += 1;
            self.next_rack
        };
        self.machine_to_rack.insert(machine, rack);
        self.rack_to_machines.entry(rack).or_default().push(machine);
        rack
    }

    fn build_task_file_set(&mut self, task: TaskId) {
        let files = self
            .dfs
            .sample_files(self.config.mean_input_blocks, self.config.percent_block_tolerance);
        tracing::debug!("Task {} sampled {} input files", task, files.len());
        self.file_sets.insert(task, files);
    }

    fn compute_costs_and_preferred_set(&mut self, task: TaskId) {
        let mut machine_frequency: HashMap<ResourceId, NumBlocks> = HashMap::new();
        let mut rack_frequency: HashMap<EquivClass, NumBlocks> = HashMap::new();
        let mut total_blocks: NumBlocks = 0;

        let file_set = self.file_sets.get(&task).cloned().unwrap_or_default();
        for file in &file_set {
            let num_blocks = self.dfs.num_blocks(*file);
            total_blocks += num_blocks;

            // Dedupe racks per file: a block replicated on two machines of
            // the same rack counts once for that rack.
            let mut racks: HashSet<EquivClass> = HashSet::new();
            for machine in self.dfs.machines_for(*file) {
                *machine_frequency.entry(*machine).or_default() += num_blocks;
                if let Some(rack) = self.machine_to_rack.get(machine) {
                    racks.insert(*rack);
                }
            }
            for rack in racks {
                *rack_frequency.entry(rack).or_default() += num_blocks;
            }
        }

        let mut preferred_machines = HashMap::new();
        let mut preferred_racks = HashMap::new();

        if total_blocks > 0 {
            for (machine, local_blocks) in &machine_frequency {
                let proportion = *local_blocks as f64 / total_blocks as f64;
                if proportion < self.config.delta_preferred_machine {
                    continue;
                }
                let rack = self.machine_to_rack.get(machine).copied();
                let rack_blocks = rack.and_then(|r| rack_frequency.get(&r)).copied().unwrap_or(*local_blocks);
                // Totals so far are inclusive; the cost formula wants the
                // exclusive remainders.
                let rack_only = rack_blocks - local_blocks;
                let core_only = total_blocks - rack_only - local_blocks;
                let cost = core_only as Cost * self.config.core_transfer_cost
                    + rack_only as Cost * self.config.tor_transfer_cost;
                tracing::debug!(
                    "Task {} preferred machine {} cost {} (local {} rack {} total {})",
                    task,
                    machine,
                    cost,
                    local_blocks,
                    rack_blocks,
                    total_blocks
                );
                preferred_machines.insert(*machine, cost);
            }

            for (rack, rack_blocks) in &rack_frequency {
                let proportion = *rack_blocks as f64 / total_blocks as f64;
                if proportion <= self.config.delta_preferred_rack {
                    continue;
                }
                let core_only = total_blocks - rack_blocks;
                let cost = core_only as Cost * self.config.core_transfer_cost
                    + *rack_blocks as Cost * self.config.tor_transfer_cost;
                tracing::debug!("Task {} preferred rack {} cost {}", task, rack, cost);
                preferred_racks.insert(*rack, cost);
            }
        }

        self.preferred_machines.insert(task, preferred_machines);
        self.preferred_racks.insert(task, preferred_racks);
        self.cluster_costs
            .insert(task, total_blocks as Cost * self.config.core_transfer_cost);
    }
}

impl CostModel for SimulatedQuincyCostModel {
    fn task_to_unscheduled_cost(&self, task: TaskId) -> Cost {
        let wait_secs = (self.wait_time_us(task) / 1_000_000) as Cost;
        (WAIT_BASE_COST + wait_secs * WAIT_COST_PER_SEC).min(self.ctx.max_arc_cost)
    }

    fn unscheduled_to_sink_cost(&self, _job: JobId) -> Cost {
        0
    }

    fn task_to_resource_cost(&self, task: TaskId, resource: ResourceId) -> Cost {
        if let Some(cost) = self.preferred_machines.get(&task).and_then(|m| m.get(&resource)) {
            return *cost;
        }
        // Cluster aggregator (or any unpreferred target): all blocks remote.
        self.cluster_costs.get(&task).copied().unwrap_or_else(|| self.default_cost())
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
        self.task_to_unscheduled_cost(task) + self.default_cost()
    }

    fn task_to_equiv_class_cost(&self, task: TaskId, ec: EquivClass) -> Cost {
        self.preferred_racks
            .get(&task)
            .and_then(|racks| racks.get(&ec))
            .copied()
            .unwrap_or_else(|| self.default_cost())
    }

    fn equiv_class_to_resource_cost(&self, _ec: EquivClass, _resource: ResourceId) -> Cost {
        // The rack-level transfer price sits on the task → rack arc.
        0
    }

    fn equiv_class_to_equiv_class_cost(&self, _src: EquivClass, _dst: EquivClass) -> Cost {
        0
    }

    fn task_equiv_classes(&self, task: TaskId) -> Vec<EquivClass> {
        let mut racks: Vec<EquivClass> = self
            .preferred_racks
            .get(&task)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        racks.sort_unstable();
        racks
    }

    fn resource_equiv_classes(&self, resource: ResourceId) -> Vec<EquivClass> {
        self.machine_to_rack
            .get(&resource)
            .map(|rack| vec![*rack])
            .unwrap_or_default()
    }

    fn task_preference_arcs(&self, task: TaskId) -> Vec<ResourceId> {
        let mut machines: Vec<ResourceId> = self
            .preferred_machines
            .get(&task)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        machines.sort();
        machines
    }

    fn equiv_class_to_equiv_class_arcs(&self, _ec: EquivClass) -> Vec<EquivClass> {
        Vec::new()
    }

    fn add_task(&mut self, task: TaskId) {
        self.build_task_file_set(task);
        self.compute_costs_and_preferred_set(task);
    }

    fn remove_task(&mut self, task: TaskId) {
        self.file_sets.remove(&task);
        self.preferred_machines.remove(&task);
        self.preferred_racks.remove(&task);
        self.cluster_costs.remove(&task);
    }

    fn add_machine(&mut self, machine: &ResourceTopologyNode) {
        let id = machine.descriptor.id;
        let rack = self.assign_rack(id);
        self.dfs.add_machine(id);
        tracing::debug!("Machine {} joins rack aggregator {}", id, rack);
    }

    fn remove_machine(&mut self, machine: ResourceId) {
        self.dfs.remove_machine(machine);
        if let Some(rack) = self.machine_to_rack.remove(&machine) {
            if let Some(members) = self.rack_to_machines.get_mut(&rack) {
                members.retain(|m| *m != machine);
            }
        }
        // Preference arcs to the machine must not survive its removal.
        for machines in self.preferred_machines.values_mut() {
            machines.remove(&machine);
        }
    }

    fn debug_info_csv(&self) -> String {
        let mut rows = String::from("task_id,total_block_cost,preferred_machines,preferred_racks\n");
        let mut ids: Vec<TaskId> = self.cluster_costs.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            rows.push_str(&format!(
                "{},{},{},{}\n",
                id,
                self.cluster_costs[&id],
                self.preferred_machines.get(&id).map(|m| m.len()).unwrap_or(0),
                self.preferred_racks.get(&id).map(|m| m.len()).unwrap_or(0),
            ));
        }
        rows
    }

    fn name(&self) -> &'static str {
        "simulated-quincy"
    }
}
