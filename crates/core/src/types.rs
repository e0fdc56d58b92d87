use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = u64;
pub type JobId = Uuid;
pub type ResourceId = Uuid;

/// Integer tag grouping tasks or resources the cost model treats identically.
pub type EquivClass = u64;

/// Arc costs are signed and bounded by `FlowSchedulerConfig::max_arc_cost`.
pub type Cost = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Runnable,
    Running,
    Completed,
    Failed,
    Aborted,
    Delegated,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Aborted)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Aborted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: TaskId,
    /// Owning job; append-only for the task's lifetime.
    pub job_id: JobId,
    pub name: String,
    /// Position within the owning job's task list.
    pub index: u64,
    pub state: TaskState,
    pub submit_time_us: u64,
    pub total_runtime_us: u64,
}

impl TaskDescriptor {
    pub fn new(id: TaskId, job_id: JobId, name: impl Into<String>, index: u64) -> Self {
        Self {
            id,
            job_id,
            name: name.into(),
            index,
            state: TaskState::Created,
            submit_time_us: 0,
            total_runtime_us: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub name: String,
    pub priority: i32,
    pub state: JobState,
    /// Ordered task ids owned by this job.
    pub tasks: Vec<TaskId>,
}

impl JobDescriptor {
    pub fn new(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            priority: 0,
            state: JobState::Created,
            tasks: Vec::new(),
        }
    }
}

/// Level of a resource in the topology tree. Only `Pu` is assignable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Coordinator,
    Rack,
    Machine,
    Socket,
    Core,
    Pu,
}

impl ResourceKind {
    pub fn is_assignable(&self) -> bool {
        matches!(self, ResourceKind::Pu)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub friendly_name: String,
    pub kind: ResourceKind,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, friendly_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            friendly_name: friendly_name.into(),
            kind,
        }
    }
}

/// A subtree of the cluster topology (cluster → racks → machines → PUs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTopologyNode {
    pub descriptor: ResourceDescriptor,
    pub children: Vec<ResourceTopologyNode>,
}

impl ResourceTopologyNode {
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            children: Vec::new(),
        }
    }

    pub fn with_children(descriptor: ResourceDescriptor, children: Vec<ResourceTopologyNode>) -> Self {
        Self {
            descriptor,
            children,
        }
    }

    /// Pre-order traversal over the subtree.
    pub fn visit(&self, f: &mut impl FnMut(&ResourceTopologyNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Ids of all assignable (PU) leaves below this node.
    pub fn leaf_ids(&self) -> Vec<ResourceId> {
        let mut leaves = Vec::new();
        self.visit(&mut |n| {
            if n.descriptor.kind.is_assignable() {
                leaves.push(n.descriptor.id);
            }
        });
        leaves
    }

    /// Number of assignable leaves below this node.
    pub fn num_leaves(&self) -> u64 {
        let mut count = 0;
        self.visit(&mut |n| {
            if n.descriptor.kind.is_assignable() {
                count += 1;
            }
        });
        count
    }

    pub fn find(&self, id: ResourceId) -> Option<&ResourceTopologyNode> {
        if self.descriptor.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

// --- Display implementations ---

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Created => write!(f, "Created"),
            TaskState::Runnable => write!(f, "Runnable"),
            TaskState::Running => write!(f, "Running"),
            TaskState::Completed => write!(f, "Completed"),
            TaskState::Failed => write!(f, "Failed"),
            TaskState::Aborted => write!(f, "Aborted"),
            TaskState::Delegated => write!(f, "Delegated"),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Aborted => write!(f, "Aborted"),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Coordinator => write!(f, "coordinator"),
            ResourceKind::Rack => write!(f, "rack"),
            ResourceKind::Machine => write!(f, "machine"),
            ResourceKind::Socket => write!(f, "socket"),
            ResourceKind::Core => write!(f, "core"),
            ResourceKind::Pu => write!(f, "pu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_machine(pus: usize) -> ResourceTopologyNode {
        let children = (0..pus)
            .map(|i| {
                ResourceTopologyNode::new(ResourceDescriptor::new(ResourceKind::Pu, format!("pu{i}")))
            })
            .collect();
        ResourceTopologyNode::with_children(
            ResourceDescriptor::new(ResourceKind::Machine, "m0"),
            children,
        )
    }

    #[test]
    fn leaf_ids_collects_only_pus() {
        let machine = one_machine(4);
        assert_eq!(machine.leaf_ids().len(), 4);
        assert_eq!(machine.num_leaves(), 4);
    }

    #[test]
    fn find_locates_nested_descriptor() {
        let machine = one_machine(2);
        let pu_id = machine.children[1].descriptor.id;
        let found = machine.find(pu_id).unwrap();
        assert_eq!(found.descriptor.kind, ResourceKind::Pu);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Runnable.is_terminal());
        assert!(JobState::Aborted.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
