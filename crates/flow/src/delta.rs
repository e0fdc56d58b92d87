use watershed_core::types::{ResourceId, TaskId};

/// The unit of change the driver applies to the cluster after a solver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaKind {
    NoOp,
    Place {
        task: TaskId,
        resource: ResourceId,
    },
    Preempt {
        task: TaskId,
        resource: ResourceId,
    },
    Migrate {
        task: TaskId,
        from: ResourceId,
        to: ResourceId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingDelta {
    pub kind: DeltaKind,
    /// Set once the driver has applied the delta to the cluster.
    pub actioned: bool,
}

impl SchedulingDelta {
    pub fn new(kind: DeltaKind) -> Self {
        Self {
            kind,
            actioned: false,
        }
    }
}

impl std::fmt::Display for SchedulingDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DeltaKind::NoOp => write!(f, "NoOp"),
            DeltaKind::Place { task, resource } => write!(f, "Place task {task} on {resource}"),
            DeltaKind::Preempt { task, resource } => {
                write!(f, "Preempt task {task} from {resource}")
            }
            DeltaKind::Migrate { task, from, to } => {
                write!(f, "Migrate task {task} from {from} to {to}")
            }
        }
    }
}
