use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use watershed_core::config::{CostModelKind, SimulatedQuincyConfig};
use watershed_core::registry::{JobMap, ResourceMap, TaskMap};
use watershed_core::stats::SharedRuntimeStats;
use watershed_core::time::TimeSource;
use watershed_core::types::{Cost, EquivClass, JobId, ResourceId, ResourceTopologyNode, TaskId};

use crate::graph::FlowNode;

pub mod coco;
pub mod octopus;
pub mod quincy;
pub mod random;
pub mod sim_quincy;
pub mod sjf;
pub mod trivial;
pub mod void;
pub mod whare;

pub use coco::CocoCostModel;
pub use octopus::OctopusCostModel;
pub use quincy::QuincyCostModel;
pub use random::RandomCostModel;
pub use sim_quincy::SimulatedQuincyCostModel;
pub use sjf::SjfCostModel;
pub use trivial::TrivialCostModel;
pub use void::VoidCostModel;
pub use whare::WhareCostModel;

/// Assignable leaf resources, shared between the graph manager (writer) and
/// cost models (readers).
pub type SharedLeafSet = Arc<RwLock<HashSet<ResourceId>>>;

pub fn new_leaf_set() -> SharedLeafSet {
    Arc::new(RwLock::new(HashSet::new()))
}

/// Prices the arcs of the flow network. The contract is total: every method
/// returns a cost, fabricating a conservative default rather than failing.
///
/// `task_to_resource_cost` may be queried for any resource a task arc can
/// target, including the cluster aggregator's root resource.
pub trait CostModel: Send {
    fn task_to_unscheduled_cost(&self, task: TaskId) -> Cost;
    fn unscheduled_to_sink_cost(&self, job: JobId) -> Cost;
    fn task_to_resource_cost(&self, task: TaskId, resource: ResourceId) -> Cost;
    fn resource_to_resource_cost(&self, src: ResourceId, dst: ResourceId) -> Cost;
    fn leaf_to_sink_cost(&self, resource: ResourceId) -> Cost;
    fn task_continuation_cost(&self, task: TaskId) -> Cost;
    fn task_preemption_cost(&self, task: TaskId) -> Cost;
    fn task_to_equiv_class_cost(&self, task: TaskId, ec: EquivClass) -> Cost;
    fn equiv_class_to_resource_cost(&self, ec: EquivClass, resource: ResourceId) -> Cost;
    fn equiv_class_to_equiv_class_cost(&self, src: EquivClass, dst: EquivClass) -> Cost;

    /// Equivalence classes the task's node gets aggregator arcs to.
    fn task_equiv_classes(&self, task: TaskId) -> Vec<EquivClass>;

    /// Equivalence classes a resource belongs to; may be empty.
    fn resource_equiv_classes(&self, resource: ResourceId) -> Vec<EquivClass>;

    /// Resources the task gets direct preference arcs to.
    fn task_preference_arcs(&self, task: TaskId) -> Vec<ResourceId>;

    /// Downstream equivalence classes an aggregator connects to; may be empty.
    fn equiv_class_to_equiv_class_arcs(&self, ec: EquivClass) -> Vec<EquivClass>;

    fn add_task(&mut self, task: TaskId);
    fn remove_task(&mut self, task: TaskId);
    fn add_machine(&mut self, machine: &ResourceTopologyNode);
    fn remove_machine(&mut self, machine: ResourceId);

    /// Whether the driver should run the topology-statistics passes for this
    /// model before and after each scheduling iteration.
    fn uses_topology_stats(&self) -> bool {
        false
    }

    /// Initializes per-node accumulators; first statistics pass.
    fn prepare_stats(&mut self, _node: &FlowNode) {}

    /// Invoked once per traversal edge in leaf-to-root order; `child` is the
    /// node nearer the sink, `parent` the newly discovered in-neighbor.
    fn gather_stats(&mut self, _child: &FlowNode, _parent: &FlowNode) {}

    /// Final propagation pass over the same edges.
    fn update_stats(&mut self, _child: &FlowNode, _parent: &FlowNode) {}

    /// Per-iteration debug rows for the `debug_cost_model` CSV stream.
    fn debug_info_csv(&self) -> String {
        String::new()
    }

    /// Name of the cost model.
    fn name(&self) -> &'static str;
}

/// Everything a cost model may need at construction time. Registries are
/// read-only from the model's perspective; writes go through the driver.
#[derive(Clone)]
pub struct CostModelContext {
    pub task_map: TaskMap,
    pub job_map: JobMap,
    pub resource_map: ResourceMap,
    pub leaf_ids: SharedLeafSet,
    pub runtime_stats: SharedRuntimeStats,
    pub time: Arc<dyn TimeSource>,
    pub max_arc_cost: Cost,
}

/// Factory dispatch keyed on the configured selector. All nine selector
/// values construct; an out-of-range selector already failed in
/// `CostModelKind::from_selector`.
pub fn create_cost_model(
    kind: CostModelKind,
    ctx: &CostModelContext,
    sim_config: &SimulatedQuincyConfig,
) -> Box<dyn CostModel> {
    tracing::info!("Using the {} cost model", kind);
    match kind {
        CostModelKind::Trivial => Box::new(TrivialCostModel::new()),
        CostModelKind::Random => Box::new(RandomCostModel::new(ctx.clone())),
        CostModelKind::Sjf => Box::new(SjfCostModel::new(ctx.clone())),
        CostModelKind::Quincy => Box::new(QuincyCostModel::new(ctx.clone())),
        CostModelKind::Whare => Box::new(WhareCostModel::new(ctx.clone())),
        CostModelKind::Coco => Box::new(CocoCostModel::new(ctx.clone())),
        CostModelKind::Octopus => Box::new(OctopusCostModel::new(ctx.clone())),
        CostModelKind::Void => Box::new(VoidCostModel::new()),
        CostModelKind::SimulatedQuincy => {
            Box::new(SimulatedQuincyCostModel::new(ctx.clone(), sim_config.clone()))
        }
    }
}

/// Stable hash used to derive equivalence classes from names and ids.
pub(crate) fn stable_hash(bytes: &[u8]) -> u64 {
    // FNV-1a; must not vary across runs the way `RandomState` does.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
