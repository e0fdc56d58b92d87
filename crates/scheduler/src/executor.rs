use std::sync::{Arc, Mutex};

use tracing::debug;

use watershed_core::types::{ResourceDescriptor, ResourceId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// The scheduler displaced the task; it stays re-runnable.
    Preemption,
    /// A user or operator asked for the task to die.
    Abort,
}

/// The executor subsystem boundary: launches and kills tasks on nodes and
/// manages per-resource executor state. Consumed by the driver, implemented
/// elsewhere.
pub trait Executor: Send {
    fn place(&mut self, task: TaskId, resource: ResourceId);
    fn kill(&mut self, task: TaskId, reason: KillReason);
    fn migrate(&mut self, task: TaskId, from: ResourceId, to: ResourceId);
    fn initialize_resource(&mut self, resource: &ResourceDescriptor, local: bool, simulated: bool);
    fn teardown_resource(&mut self, resource: ResourceId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorAction {
    Place {
        task: TaskId,
        resource: ResourceId,
    },
    Kill {
        task: TaskId,
        reason: KillReason,
    },
    Migrate {
        task: TaskId,
        from: ResourceId,
        to: ResourceId,
    },
    InitializeResource {
        resource: ResourceId,
        local: bool,
        simulated: bool,
    },
    TeardownResource {
        resource: ResourceId,
    },
}

pub type ActionLog = Arc<Mutex<Vec<ExecutorAction>>>;

/// Executor stand-in for simulations: records every action instead of
/// touching real nodes.
pub struct SimulatedExecutor {
    actions: ActionLog,
}

impl SimulatedExecutor {
    /// Returns the executor and a shared handle to its action log.
    pub fn new() -> (Self, ActionLog) {
        let actions: ActionLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                actions: actions.clone(),
            },
            actions,
        )
    }
}

impl Executor for SimulatedExecutor {
    fn place(&mut self, task: TaskId, resource: ResourceId) {
        debug!("Simulated place of task {} on {}", task, resource);
        self.actions
            .lock()
            .unwrap()
            .push(ExecutorAction::Place { task, resource });
    }

    fn kill(&mut self, task: TaskId, reason: KillReason) {
        debug!("Simulated kill of task {} ({:?})", task, reason);
        self.actions
            .lock()
            .unwrap()
            .push(ExecutorAction::Kill { task, reason });
    }

    fn migrate(&mut self, task: TaskId, from: ResourceId, to: ResourceId) {
        debug!("Simulated migrate of task {} from {} to {}", task, from, to);
        self.actions
            .lock()
            .unwrap()
            .push(ExecutorAction::Migrate { task, from, to });
    }

    fn initialize_resource(&mut self, resource: &ResourceDescriptor, local: bool, simulated: bool) {
        self.actions.lock().unwrap().push(ExecutorAction::InitializeResource {
            resource: resource.id,
            local,
            simulated,
        });
    }

    fn teardown_resource(&mut self, resource: ResourceId) {
        self.actions
            .lock()
            .unwrap()
            .push(ExecutorAction::TeardownResource { resource });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn simulated_executor_records_actions_in_order() {
        let (mut executor, log) = SimulatedExecutor::new();
        let resource = Uuid::new_v4();
        executor.place(1, resource);
        executor.kill(1, KillReason::Preemption);

        let actions = log.lock().unwrap();
        assert_eq!(
            *actions,
            vec![
                ExecutorAction::Place { task: 1, resource },
                ExecutorAction::Kill {
                    task: 1,
                    reason: KillReason::Preemption
                },
            ]
        );
    }
}
