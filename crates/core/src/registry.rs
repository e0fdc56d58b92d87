use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::{JobDescriptor, JobId, ResourceDescriptor, ResourceId, TaskDescriptor, TaskId, TaskState};

/// Shared registry handles. The scheduling driver owns the data; cost models
/// clone the `Arc` for read-only queries by id. All access happens under the
/// driver's scheduling lock, so the inner locks are never contended.
pub type TaskMap = Arc<RwLock<HashMap<TaskId, TaskDescriptor>>>;
pub type JobMap = Arc<RwLock<HashMap<JobId, JobDescriptor>>>;
pub type ResourceMap = Arc<RwLock<HashMap<ResourceId, ResourceDescriptor>>>;

pub fn new_task_map() -> TaskMap {
    Arc::new(RwLock::new(HashMap::new()))
}

pub fn new_job_map() -> JobMap {
    Arc::new(RwLock::new(HashMap::new()))
}

pub fn new_resource_map() -> ResourceMap {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Ids of the job's tasks currently in the `Runnable` state.
pub fn runnable_tasks_for_job(job: &JobDescriptor, task_map: &TaskMap) -> Vec<TaskId> {
    let tasks = task_map.read().unwrap();
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn runnable_tasks_filters_by_state() {
        let job_id = Uuid::new_v4();
        let mut job = JobDescriptor::new(job_id, "job");
        let task_map = new_task_map();
        {
            let mut tasks = task_map.write().unwrap();
            for i in 0..3u64 {
                let mut td = TaskDescriptor::new(i, job_id, format!("t{i}"), i);
                td.state = if i == 1 {
                    TaskState::Running
                } else {
                    TaskState::Runnable
                };
                tasks.insert(i, td);
                job.tasks.push(i);
            }
        }
        let runnable = runnable_tasks_for_job(&job, &task_map);
        assert_eq!(runnable, vec![0, 2]);
    }
}
