use std::collections::HashMap;

use watershed_core::types::{Cost, EquivClass, ResourceId, TaskId};

use crate::error::{FlowError, FlowResult};

pub type FlowNodeId = u64;
pub type FlowArcId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowNodeKind {
    Root,
    JobAggregate,
    UnscheduledTask,
    ScheduledTask,
    RootTask,
    EquivClassAgg,
    Resource,
    Pu,
    Sink,
    ClusterAgg,
    Machine,
}

impl FlowNodeKind {
    /// Task nodes are the only admissible sources in a solver mapping.
    pub fn is_task(&self) -> bool {
        matches!(
            self,
            FlowNodeKind::UnscheduledTask | FlowNodeKind::ScheduledTask | FlowNodeKind::RootTask
        )
    }

    /// Nodes that belong to the resource topology tree.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            FlowNodeKind::ClusterAgg
                | FlowNodeKind::Resource
                | FlowNodeKind::Machine
                | FlowNodeKind::Pu
        )
    }
}

/// Optional entity references attached to a flow node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeRefs {
    pub task: Option<TaskId>,
    pub resource: Option<ResourceId>,
    pub equiv_class: Option<EquivClass>,
}

impl NodeRefs {
    pub fn task(task: TaskId) -> Self {
        Self {
            task: Some(task),
            ..Self::default()
        }
    }

    pub fn resource(resource: ResourceId) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }

    pub fn equiv_class(ec: EquivClass) -> Self {
        Self {
            equiv_class: Some(ec),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: FlowNodeId,
    pub kind: FlowNodeKind,
    pub task: Option<TaskId>,
    pub resource: Option<ResourceId>,
    pub equiv_class: Option<EquivClass>,
    /// Positive = source of flow, negative = demand, zero = transshipment.
    pub supply: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowArc {
    pub id: FlowArcId,
    pub src: FlowNodeId,
    pub dst: FlowNodeId,
    pub cap_lower: u64,
    pub cap_upper: u64,
    pub cost: Cost,
}

/// Counters of graph mutations since the last reset; one line in the
/// scheduler_events trace stream per iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphChangeStats {
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub arcs_added: u64,
    pub arcs_changed: u64,
    pub arcs_removed: u64,
}

impl std::fmt::Display for GraphChangeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nodes_added={} nodes_removed={} arcs_added={} arcs_changed={} arcs_removed={}",
            self.nodes_added, self.nodes_removed, self.arcs_added, self.arcs_changed, self.arcs_removed
        )
    }
}

/// The flow network: nodes, directed arcs with capacities and costs, and
/// supply bookkeeping. Node ids are monotonically increasing and never
/// reused; traversal order over a node's outgoing arcs is insertion order
/// and stable between mutations of other nodes.
pub struct GraphModel {
    nodes: HashMap<FlowNodeId, FlowNode>,
    arcs: HashMap<FlowArcId, FlowArc>,
    outgoing: HashMap<FlowNodeId, Vec<FlowArcId>>,
    incoming: HashMap<FlowNodeId, Vec<FlowArcId>>,
    arc_by_endpoints: HashMap<(FlowNodeId, FlowNodeId), FlowArcId>,
    next_node_id: FlowNodeId,
    next_arc_id: FlowArcId,
    changes: GraphChangeStats,
}

impl GraphModel {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            arcs: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            arc_by_endpoints: HashMap::new(),
            // DIMACS node ids are 1-based.
            next_node_id: 1,
            next_arc_id: 1,
            changes: GraphChangeStats::default(),
        }
    }

    pub fn add_node(&mut self, kind: FlowNodeKind, refs: NodeRefs) -> FlowNodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            FlowNode {
                id,
                kind,
                task: refs.task,
                resource: refs.resource,
                equiv_class: refs.equiv_class,
                supply: 0,
            },
        );
        self.outgoing.insert(id, Vec::new());
        self.incoming.insert(id, Vec::new());
        self.changes.nodes_added += 1;
        id
    }

    /// Adds an arc. Fails if either endpoint is unknown, or if an arc between
    /// the endpoints already exists and `merge` was not requested; with
    /// `merge` the existing arc is updated in place.
    pub fn add_arc(
        &mut self,
        src: FlowNodeId,
        dst: FlowNodeId,
        cap_lower: u64,
        cap_upper: u64,
        cost: Cost,
        merge: bool,
    ) -> FlowResult<FlowArcId> {
        if !self.nodes.contains_key(&src) {
            return Err(FlowError::UnknownNode(src));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(FlowError::UnknownNode(dst));
        }
        if let Some(existing) = self.arc_by_endpoints.get(&(src, dst)).copied() {
            if !merge {
                return Err(FlowError::DuplicateArc(src, dst));
            }
            self.change_arc(existing, cap_lower, cap_upper, cost)?;
            return Ok(existing);
        }
        let id = self.next_arc_id;
        self.next_arc_id += 1;
        self.arcs.insert(
            id,
            FlowArc {
                id,
                src,
                dst,
                cap_lower,
                cap_upper,
                cost,
            },
        );
        self.outgoing.get_mut(&src).unwrap().push(id);
        self.incoming.get_mut(&dst).unwrap().push(id);
        self.arc_by_endpoints.insert((src, dst), id);
        self.changes.arcs_added += 1;
        Ok(id)
    }

    /// Updates an arc in place without reordering traversal. A call that
    /// changes nothing is a no-op and is not counted as a mutation.
    pub fn change_arc(
        &mut self,
        arc_id: FlowArcId,
        cap_lower: u64,
        cap_upper: u64,
        cost: Cost,
    ) -> FlowResult<()> {
        let arc = self.arcs.get_mut(&arc_id).ok_or(FlowError::UnknownArc(arc_id))?;
        if arc.cap_lower == cap_lower && arc.cap_upper == cap_upper && arc.cost == cost {
            return Ok(());
        }
        arc.cap_lower = cap_lower;
        arc.cap_upper = cap_upper;
        arc.cost = cost;
        self.changes.arcs_changed += 1;
        Ok(())
    }

    pub fn remove_arc(&mut self, arc_id: FlowArcId) -> FlowResult<()> {
        let arc = self.arcs.remove(&arc_id).ok_or(FlowError::UnknownArc(arc_id))?;
        if let Some(out) = self.outgoing.get_mut(&arc.src) {
            out.retain(|id| *id != arc_id);
        }
        if let Some(inc) = self.incoming.get_mut(&arc.dst) {
            inc.retain(|id| *id != arc_id);
        }
        self.arc_by_endpoints.remove(&(arc.src, arc.dst));
        self.changes.arcs_removed += 1;
        Ok(())
    }

    /// Removes the node and all incident arcs. Callers must have already
    /// detached task bindings.
    pub fn remove_node(&mut self, id: FlowNodeId) -> FlowResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(FlowError::UnknownNode(id));
        }
        let mut incident: Vec<FlowArcId> = self.outgoing.get(&id).cloned().unwrap_or_default();
        incident.extend(self.incoming.get(&id).cloned().unwrap_or_default());
        for arc_id in incident {
            // An arc can appear in both lists only for a self-loop.
            if self.arcs.contains_key(&arc_id) {
                self.remove_arc(arc_id)?;
            }
        }
        self.nodes.remove(&id);
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        self.changes.nodes_removed += 1;
        Ok(())
    }

    /// Lazy sequence of outgoing arcs in insertion order.
    pub fn iterate_arcs(&self, node: FlowNodeId) -> impl Iterator<Item = &FlowArc> + '_ {
        self.outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |id| &self.arcs[id])
    }

    /// Lazy sequence of incoming arcs in insertion order.
    pub fn iterate_incoming_arcs(&self, node: FlowNodeId) -> impl Iterator<Item = &FlowArc> + '_ {
        self.incoming
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |id| &self.arcs[id])
    }

    pub fn node(&self, id: FlowNodeId) -> Option<&FlowNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: FlowNodeId) -> Option<&mut FlowNode> {
        self.nodes.get_mut(&id)
    }

    pub fn arc(&self, id: FlowArcId) -> Option<&FlowArc> {
        self.arcs.get(&id)
    }

    pub fn arc_between(&self, src: FlowNodeId, dst: FlowNodeId) -> Option<&FlowArc> {
        self.arc_by_endpoints.get(&(src, dst)).map(|id| &self.arcs[id])
    }

    pub fn set_supply(&mut self, id: FlowNodeId, supply: i64) -> FlowResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(FlowError::UnknownNode(id))?;
        node.supply = supply;
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Largest node id handed out so far; DIMACS emission sizes off this.
    pub fn max_node_id(&self) -> FlowNodeId {
        self.next_node_id - 1
    }

    /// Node ids in ascending order, for deterministic serialization.
    pub fn sorted_node_ids(&self) -> Vec<FlowNodeId> {
        let mut ids: Vec<FlowNodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> + '_ {
        self.nodes.values()
    }

    /// Sum of positive supplies minus demand magnitude; zero when balanced.
    pub fn supply_imbalance(&self) -> i64 {
        self.nodes.values().map(|n| n.supply).sum()
    }

    /// Returns the accumulated change counters and resets them.
    pub fn take_change_stats(&mut self) -> GraphChangeStats {
        std::mem::take(&mut self.changes)
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}
