use std::collections::HashMap;

use tracing::{debug, info, warn};

use watershed_core::registry::TaskMap;
use watershed_core::types::{
    Cost, EquivClass, JobDescriptor, JobId, ResourceId, ResourceKind, ResourceTopologyNode, TaskId,
    TaskState,
};

use crate::cost_model::{CostModel, SharedLeafSet};
use crate::error::{FlowError, FlowResult};
use crate::graph::{
    FlowNodeId, FlowNodeKind, GraphChangeStats, GraphModel, NodeRefs,
};

/// Maintains the flow network against cluster and job churn. Owns all nodes
/// and arcs exclusively; the cost model is consulted for every cost and
/// notified of every task and machine lifecycle event.
pub struct FlowGraph {
    graph: GraphModel,
    cost_model: Box<dyn CostModel>,
    task_map: TaskMap,
    leaf_ids: SharedLeafSet,
    max_arc_cost: Cost,
    sink: FlowNodeId,
    cluster_agg: FlowNodeId,
    root_resource: Option<ResourceId>,
    task_nodes: HashMap<TaskId, FlowNodeId>,
    resource_nodes: HashMap<ResourceId, FlowNodeId>,
    unsched_aggs: HashMap<JobId, FlowNodeId>,
    ec_nodes: HashMap<EquivClass, FlowNodeId>,
    /// Assignable leaves below each topology node, for aggregate capacities.
    subtree_leaves: HashMap<FlowNodeId, u64>,
    topology_added: bool,
}

impl FlowGraph {
    pub fn new(
        cost_model: Box<dyn CostModel>,
        task_map: TaskMap,
        leaf_ids: SharedLeafSet,
        max_arc_cost: Cost,
    ) -> Self {
        let mut graph = GraphModel::new();
        let sink = graph.add_node(FlowNodeKind::Sink, NodeRefs::default());
        let cluster_agg = graph.add_node(FlowNodeKind::ClusterAgg, NodeRefs::default());
        Self {
            graph,
            cost_model,
            task_map,
            leaf_ids,
            max_arc_cost,
            sink,
            cluster_agg,
            root_resource: None,
            task_nodes: HashMap::new(),
            resource_nodes: HashMap::new(),
            unsched_aggs: HashMap::new(),
            ec_nodes: HashMap::new(),
            subtree_leaves: HashMap::new(),
            topology_added: false,
        }
    }

    pub fn model(&self) -> &GraphModel {
        &self.graph
    }

    pub fn sink_node(&self) -> FlowNodeId {
        self.sink
    }

    pub fn cluster_agg_node(&self) -> FlowNodeId {
        self.cluster_agg
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    pub fn task_node(&self, task: TaskId) -> Option<FlowNodeId> {
        self.task_nodes.get(&task).copied()
    }

    pub fn resource_node(&self, resource: ResourceId) -> Option<FlowNodeId> {
        self.resource_nodes.get(&resource).copied()
    }

    pub fn cost_model(&self) -> &dyn CostModel {
        self.cost_model.as_ref()
    }

    pub fn take_change_stats(&mut self) -> GraphChangeStats {
        self.graph.take_change_stats()
    }

    /// Whether the resource topology has been installed yet; before that the
    /// graph holds only the sink and the cluster aggregator.
    pub fn has_topology(&self) -> bool {
        self.topology_added
    }

    fn clamp(&self, cost: Cost) -> Cost {
        cost.clamp(-self.max_arc_cost, self.max_arc_cost)
    }

    // ── Topology maintenance ────────────────────────────────────────

    /// Installs the initial resource topology. Must be called exactly once.
    pub fn add_resource_topology(&mut self, root: &ResourceTopologyNode) {
        assert!(
            !self.topology_added,
            "resource topology must be installed exactly once"
        );
        info!(
            "Installing resource topology with {} assignable leaves",
            root.num_leaves()
        );
        let root_id = root.descriptor.id;
        self.root_resource = Some(root_id);
        self.resource_nodes.insert(root_id, self.cluster_agg);
        if let Some(node) = self.graph.node_mut(self.cluster_agg) {
            node.resource = Some(root_id);
        }
        self.subtree_leaves.insert(self.cluster_agg, root.num_leaves());
        self.topology_added = true;
        for child in &root.children {
            self.add_resource_subtree(self.cluster_agg, child)
                .expect("fresh topology nodes cannot collide");
        }
    }

    /// Incremental add of a single machine under the existing topology.
    pub fn add_machine(&mut self, subtree: &ResourceTopologyNode) -> FlowResult<()> {
        assert!(
            self.topology_added,
            "machines join under an installed topology"
        );
        if let Some(count) = self.subtree_leaves.get_mut(&self.cluster_agg) {
            *count += subtree.num_leaves();
        }
        self.add_resource_subtree(self.cluster_agg, subtree)
    }

    fn add_resource_subtree(
        &mut self,
        parent_node: FlowNodeId,
        node: &ResourceTopologyNode,
    ) -> FlowResult<()> {
        let resource = node.descriptor.id;
        if self.resource_nodes.contains_key(&resource) {
            debug!("Resource {} already in the flow graph", resource);
            return Ok(());
        }

        // The cost model learns about the machine before any arc is priced,
        // so rack membership and DFS state exist for the arcs below.
        if node.descriptor.kind == ResourceKind::Machine {
            self.cost_model.add_machine(node);
        }

        let kind = match node.descriptor.kind {
            ResourceKind::Machine => FlowNodeKind::Machine,
            ResourceKind::Pu => FlowNodeKind::Pu,
            _ => FlowNodeKind::Resource,
        };
        let node_id = self.graph.add_node(kind, NodeRefs::resource(resource));
        self.resource_nodes.insert(resource, node_id);
        self.subtree_leaves.insert(node_id, node.num_leaves().max(1));

        let parent_resource = self
            .graph
            .node(parent_node)
            .and_then(|n| n.resource)
            .ok_or(FlowError::UnknownNode(parent_node))?;
        let capacity = node.num_leaves().max(1);
        let cost = self.clamp(self.cost_model.resource_to_resource_cost(parent_resource, resource));
        self.graph.add_arc(parent_node, node_id, 0, capacity, cost, true)?;

        if kind == FlowNodeKind::Pu {
            let cost = self.clamp(self.cost_model.leaf_to_sink_cost(resource));
            self.graph.add_arc(node_id, self.sink, 0, 1, cost, true)?;
            self.leaf_ids.write().unwrap().insert(resource);
        }

        for child in &node.children {
            self.add_resource_subtree(node_id, child)?;
        }
        Ok(())
    }

    /// Removes the machine and all descendants transactionally. Tasks bound
    /// to descendant PUs are unbound, returned to the unscheduled state in
    /// the graph, and reported back so the driver can re-queue them.
    pub fn remove_machine(&mut self, machine: ResourceId) -> FlowResult<Vec<TaskId>> {
        let machine_node = self
            .resource_nodes
            .get(&machine)
            .copied()
            .ok_or(FlowError::UnknownResource(machine))?;

        // Scrub the model first; re-materialized arcs below must not point
        // at the machine being removed.
        self.cost_model.remove_machine(machine);

        // Collect the machine's topology subtree.
        let mut subtree = vec![machine_node];
        let mut queue = vec![machine_node];
        while let Some(current) = queue.pop() {
            for arc in self.graph.iterate_arcs(current) {
                let dst = arc.dst;
                if dst == self.sink {
                    continue;
                }
                if let Some(node) = self.graph.node(dst) {
                    if node.kind.is_topology() {
                        subtree.push(dst);
                        queue.push(dst);
                    }
                }
            }
        }

        // Tasks bound to descendant PUs lose their binding.
        let mut evicted = Vec::new();
        for node_id in &subtree {
            let node = match self.graph.node(*node_id) {
                Some(n) => n,
                None => continue,
            };
            if node.kind != FlowNodeKind::Pu {
                continue;
            }
            let bound: Vec<TaskId> = self
                .graph
                .iterate_incoming_arcs(*node_id)
                .filter_map(|arc| self.graph.node(arc.src))
                .filter(|src| src.kind == FlowNodeKind::ScheduledTask)
                .filter_map(|src| src.task)
                .collect();
            evicted.extend(bound);
        }
        for task in &evicted {
            warn!("Task {} unbound by removal of machine {}", task, machine);
            self.revert_to_unscheduled(*task);
        }

        for node_id in subtree {
            if let Some(node) = self.graph.node(node_id) {
                if let Some(resource) = node.resource {
                    self.resource_nodes.remove(&resource);
                    self.leaf_ids.write().unwrap().remove(&resource);
                }
            }
            self.subtree_leaves.remove(&node_id);
            self.graph.remove_node(node_id)?;
        }
        Ok(evicted)
    }

    // ── Job and task maintenance ────────────────────────────────────

    /// Ensures the job aggregate exists and every runnable task has an
    /// unscheduled node with arcs to (i) the job's unscheduled aggregator,
    /// (ii) its equivalence classes, (iii) its preference resources and
    /// (iv) the cluster aggregator. Idempotent for unchanged inputs.
    pub fn add_or_update_job_nodes(&mut self, job: &JobDescriptor) {
        let unsched_agg = self.ensure_unscheduled_agg(job);

        let runnable: Vec<TaskId> = {
            let tasks = self.task_map.read().unwrap();
            job.tasks
                .iter()
                .filter(|id| {
                    tasks
                        .get(id)
                        .map(|td| td.state == TaskState::Runnable)
                        .unwrap_or(false)
                })
                .copied()
                .collect()
        };

        for task in runnable {
            if !self.task_nodes.contains_key(&task) {
                self.cost_model.add_task(task);
                let node = self
                    .graph
                    .add_node(FlowNodeKind::UnscheduledTask, NodeRefs::task(task));
                self.graph.set_supply(node, 1).expect("node just added");
                self.adjust_sink_supply(-1);
                self.task_nodes.insert(task, node);
                debug!("Task {} enters the flow graph as node {}", task, node);
            }
            self.add_task_arcs(task, unsched_agg);
        }
    }

    fn ensure_unscheduled_agg(&mut self, job: &JobDescriptor) -> FlowNodeId {
        let agg = match self.unsched_aggs.get(&job.id) {
            Some(id) => *id,
            None => {
                let id = self.graph.add_node(FlowNodeKind::JobAggregate, NodeRefs::default());
                self.unsched_aggs.insert(job.id, id);
                id
            }
        };
        let capacity = (job.tasks.len() as u64).max(1);
        let cost = self.clamp(self.cost_model.unscheduled_to_sink_cost(job.id));
        self.graph
            .add_arc(agg, self.sink, 0, capacity, cost, true)
            .expect("aggregate and sink both exist");
        agg
    }

    fn ensure_equiv_class_node(&mut self, ec: EquivClass) -> FlowNodeId {
        if let Some(id) = self.ec_nodes.get(&ec) {
            return *id;
        }
        let id = self.graph.add_node(FlowNodeKind::EquivClassAgg, NodeRefs::equiv_class(ec));
        self.ec_nodes.insert(ec, id);
        id
    }

    /// Wires an equivalence class aggregator to its member resources and
    /// downstream aggregators. An empty membership produces no arcs.
    fn wire_equiv_class(&mut self, ec: EquivClass) {
        let ec_node = self.ensure_equiv_class_node(ec);

        let members: Vec<(ResourceId, FlowNodeId)> = self
            .resource_nodes
            .iter()
            .filter(|(resource, node_id)| {
                **node_id != self.cluster_agg
                    && self.cost_model.resource_equiv_classes(**resource).contains(&ec)
            })
            .map(|(r, n)| (*r, *n))
            .collect();
        for (resource, node_id) in members {
            let capacity = self.subtree_leaves.get(&node_id).copied().unwrap_or(1);
            let cost = self.clamp(self.cost_model.equiv_class_to_resource_cost(ec, resource));
            self.graph
                .add_arc(ec_node, node_id, 0, capacity, cost, true)
                .expect("both endpoints exist");
        }

        for downstream in self.cost_model.equiv_class_to_equiv_class_arcs(ec) {
            let downstream_node = self.ensure_equiv_class_node(downstream);
            let cost = self.clamp(self.cost_model.equiv_class_to_equiv_class_cost(ec, downstream));
            let capacity = self.subtree_leaves.get(&self.cluster_agg).copied().unwrap_or(1);
            self.graph
                .add_arc(ec_node, downstream_node, 0, capacity, cost, true)
                .expect("both endpoints exist");
        }
    }

    /// (Re)materializes an unscheduled task's outgoing arcs from cost-model
    /// answers. Merging keeps repeated calls idempotent.
    fn add_task_arcs(&mut self, task: TaskId, unsched_agg: FlowNodeId) {
        let task_node = self.task_nodes[&task];

        let cost = self.clamp(self.cost_model.task_to_unscheduled_cost(task));
        self.graph
            .add_arc(task_node, unsched_agg, 0, 1, cost, true)
            .expect("task and aggregate exist");

        if let Some(root) = self.root_resource {
            let cost = self.clamp(self.cost_model.task_to_resource_cost(task, root));
            self.graph
                .add_arc(task_node, self.cluster_agg, 0, 1, cost, true)
                .expect("cluster aggregator exists");
        }

        for ec in self.cost_model.task_equiv_classes(task) {
            self.wire_equiv_class(ec);
            let ec_node = self.ec_nodes[&ec];
            let cost = self.clamp(self.cost_model.task_to_equiv_class_cost(task, ec));
            self.graph
                .add_arc(task_node, ec_node, 0, 1, cost, true)
                .expect("equivalence class node exists");
        }

        for resource in self.cost_model.task_preference_arcs(task) {
            let Some(resource_node) = self.resource_nodes.get(&resource).copied() else {
                debug!("Preference arc target {} no longer exists", resource);
                continue;
            };
            let cost = self.clamp(self.cost_model.task_to_resource_cost(task, resource));
            self.graph
                .add_arc(task_node, resource_node, 0, 1, cost, true)
                .expect("preference target exists");
        }
    }

    /// Flips the task to the scheduled state: its node keeps exactly one
    /// outgoing arc, to the assigned PU.
    pub fn task_scheduled(&mut self, task: TaskId, resource: ResourceId) {
        let task_node = *self
            .task_nodes
            .get(&task)
            .unwrap_or_else(|| panic!("scheduled task {task} has no flow node"));
        let pu_node = *self
            .resource_nodes
            .get(&resource)
            .unwrap_or_else(|| panic!("scheduled task {task} bound to unknown resource {resource}"));

        if let Some(node) = self.graph.node_mut(task_node) {
            node.kind = FlowNodeKind::ScheduledTask;
        }

        let stale: Vec<_> = self
            .graph
            .iterate_arcs(task_node)
            .filter(|arc| arc.dst != pu_node)
            .map(|arc| arc.id)
            .collect();
        for arc in stale {
            self.graph.remove_arc(arc).expect("arc listed a moment ago");
        }

        let cost = self.clamp(self.cost_model.task_continuation_cost(task));
        self.graph
            .add_arc(task_node, pu_node, 0, 1, cost, true)
            .expect("task and PU exist");
        debug!("Task {} scheduled on {}", task, resource);
    }

    /// Returns the task to the unscheduled state, re-materializing its arcs.
    pub fn task_evicted(&mut self, task: TaskId, resource: ResourceId) {
        debug!("Task {} evicted from {}", task, resource);
        self.revert_to_unscheduled(task);
    }

    fn revert_to_unscheduled(&mut self, task: TaskId) {
        let task_node = *self
            .task_nodes
            .get(&task)
            .unwrap_or_else(|| panic!("evicted task {task} has no flow node"));
        if let Some(node) = self.graph.node_mut(task_node) {
            node.kind = FlowNodeKind::UnscheduledTask;
        }
        let stale: Vec<_> = self.graph.iterate_arcs(task_node).map(|arc| arc.id).collect();
        for arc in stale {
            self.graph.remove_arc(arc).expect("arc listed a moment ago");
        }

        let job_id = {
            let tasks = self.task_map.read().unwrap();
            tasks
                .get(&task)
                .unwrap_or_else(|| panic!("task {task} missing from the task registry"))
                .job_id
        };
        // A finished job has no aggregate left; the node stays detached and
        // the driver decides the task's fate.
        let Some(unsched_agg) = self.unsched_aggs.get(&job_id).copied() else {
            debug!("Job {} is gone, task {} left without arcs", job_id, task);
            return;
        };
        self.add_task_arcs(task, unsched_agg);
    }

    /// Atomic rebinding of a scheduled task to a different PU.
    pub fn task_migrated(&mut self, task: TaskId, from: ResourceId, to: ResourceId) {
        debug!("Task {} migrates {} -> {}", task, from, to);
        let task_node = *self
            .task_nodes
            .get(&task)
            .unwrap_or_else(|| panic!("migrated task {task} has no flow node"));
        let old_pu = self.resource_nodes.get(&from).copied();
        if let Some(old_pu) = old_pu {
            if let Some(arc) = self.graph.arc_between(task_node, old_pu) {
                let id = arc.id;
                self.graph.remove_arc(id).expect("arc looked up a moment ago");
            }
        }
        self.task_scheduled(task, to);
    }

    pub fn task_completed(&mut self, task: TaskId) {
        self.remove_task_node(task);
    }

    pub fn task_failed(&mut self, task: TaskId) {
        self.remove_task_node(task);
    }

    pub fn task_killed(&mut self, task: TaskId) {
        self.remove_task_node(task);
    }

    fn remove_task_node(&mut self, task: TaskId) {
        self.cost_model.remove_task(task);
        if let Some(node) = self.task_nodes.remove(&task) {
            self.graph.remove_node(node).expect("task node tracked in the index");
            self.adjust_sink_supply(1);
        }
    }

    /// Drops the job's unscheduled aggregate once the job is done.
    pub fn job_completed(&mut self, job: JobId) {
        if let Some(agg) = self.unsched_aggs.remove(&job) {
            self.graph.remove_node(agg).expect("aggregate tracked in the index");
        }
    }

    fn adjust_sink_supply(&mut self, delta: i64) {
        let supply = self.graph.node(self.sink).map(|n| n.supply).unwrap_or(0);
        self.graph
            .set_supply(self.sink, supply + delta)
            .expect("sink always exists");
    }

    /// Refreshes arc costs that are functions of wall time, for every job
    /// still active.
    pub fn update_time_dependent_costs(&mut self, jobs: &[&JobDescriptor]) {
        for job in jobs {
            let Some(agg) = self.unsched_aggs.get(&job.id).copied() else {
                continue;
            };
            let cost = self.clamp(self.cost_model.unscheduled_to_sink_cost(job.id));
            if let Some(arc) = self.graph.arc_between(agg, self.sink) {
                let (id, lb, ub) = (arc.id, arc.cap_lower, arc.cap_upper);
                self.graph.change_arc(id, lb, ub, cost).expect("arc looked up a moment ago");
            }
            for task in &job.tasks {
                let Some(task_node) = self.task_nodes.get(task).copied() else {
                    continue;
                };
                let is_unscheduled = self
                    .graph
                    .node(task_node)
                    .map(|n| n.kind == FlowNodeKind::UnscheduledTask)
                    .unwrap_or(false);
                if !is_unscheduled {
                    continue;
                }
                let cost = self.clamp(self.cost_model.task_to_unscheduled_cost(*task));
                if let Some(arc) = self.graph.arc_between(task_node, agg) {
                    let (id, lb, ub) = (arc.id, arc.cap_lower, arc.cap_upper);
                    self.graph.change_arc(id, lb, ub, cost).expect("arc looked up a moment ago");
                }
            }
        }
    }

    /// Three-pass reverse BFS from the sink: `prepare` initializes
    /// accumulators, `gather` collects leaf facts, `update` propagates them.
    /// Every reachable node is visited exactly once per pass, in an order
    /// stable for a given graph.
    pub fn compute_topology_statistics(&mut self) {
        let Self {
            graph, cost_model, sink, ..
        } = self;

        let mut order: Vec<FlowNodeId> = Vec::new();
        let mut edges: Vec<(FlowNodeId, FlowNodeId)> = Vec::new();
        let mut visited: std::collections::HashSet<FlowNodeId> = std::collections::HashSet::new();
        let mut queue: std::collections::VecDeque<FlowNodeId> = std::collections::VecDeque::new();

        visited.insert(*sink);
        queue.push_back(*sink);
        while let Some(current) = queue.pop_front() {
            order.push(current);
            for arc in graph.iterate_incoming_arcs(current) {
                edges.push((current, arc.src));
                if visited.insert(arc.src) {
                    queue.push_back(arc.src);
                }
            }
        }

        for id in &order {
            if let Some(node) = graph.node(*id) {
                cost_model.prepare_stats(node);
            }
        }
        for (child, parent) in &edges {
            if let (Some(child), Some(parent)) = (graph.node(*child), graph.node(*parent)) {
                cost_model.gather_stats(child, parent);
            }
        }
        for (child, parent) in &edges {
            if let (Some(child), Some(parent)) = (graph.node(*child), graph.node(*parent)) {
                cost_model.update_stats(child, parent);
            }
        }
    }
}
