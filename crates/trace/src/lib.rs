//! watershed-trace — CSV trace emission in the Google cluster-trace layout.
//!
//! Six streams are written under a configured root directory; machine and
//! task events stream out as they happen, per-task runtimes and per-job task
//! counts are accumulated and flushed at shutdown.

use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use watershed_core::time::TimeSource;
use watershed_core::types::{JobDescriptor, ResourceDescriptor, TaskDescriptor, TaskId};

/// Friendly-name prefixes that mark simulated entities; their numeric suffix
/// is the trace id.
pub const SIMULATION_MACHINE_PREFIX: &str = "watershed_simulation_machine_";
pub const SIMULATION_JOB_PREFIX: &str = "watershed_simulation_job_";

/// Seed for hash-derived trace ids of non-simulated entities.
const TRACE_ID_SEED: u64 = 42;

// Machine event codes.
const MACHINE_ADD: i32 = 0;
const MACHINE_REMOVE: i32 = 1;

// Task event codes.
const TASK_SUBMIT: i32 = 0;
const TASK_SCHEDULE: i32 = 1;
const TASK_EVICT: i32 = 2;
const TASK_FAIL: i32 = 3;
const TASK_COMPLETE: i32 = 4;
const TASK_KILL: i32 = 5;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wall-clock runtimes of one scheduling iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerRunStats {
    pub scheduler_runtime_us: u64,
    pub algorithm_runtime_us: u64,
    pub total_runtime_us: u64,
}

/// Accumulated per-task counters, flushed to task_runtime_events at shutdown.
#[derive(Debug, Clone, Copy, Default)]
struct TaskRuntime {
    trace_task_id: u64,
    start_time: u64,
    total_runtime: u64,
    runtime: u64,
    num_runs: u64,
    last_schedule_time: u64,
    /// Single-incarnation guard: at most one running span per task id.
    running: bool,
}

fn stable_hash_u64(bytes: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// The single logical writer for all trace streams.
pub struct TraceEmitter {
    enabled: bool,
    time: Arc<dyn TimeSource>,
    machine_events: Option<BufWriter<File>>,
    scheduler_events: Option<BufWriter<File>>,
    task_events: Option<BufWriter<File>>,
    task_runtime_events: Option<BufWriter<File>>,
    jobs_num_tasks: Option<BufWriter<File>>,
    task_usage_stat: Option<BufWriter<File>>,
    task_to_job: HashMap<TaskId, u64>,
    job_num_tasks: HashMap<u64, u64>,
    task_to_runtime: HashMap<TaskId, TaskRuntime>,
    shut_down: bool,
}

impl TraceEmitter {
    /// Opens the six streams under `root`. Failure here is fatal: a trace
    /// that cannot start must not be silently dropped.
    pub fn new(enabled: bool, root: &Path, time: Arc<dyn TimeSource>) -> Result<Self, TraceError> {
        let mut emitter = Self {
            enabled,
            time,
            machine_events: None,
            scheduler_events: None,
            task_events: None,
            task_runtime_events: None,
            jobs_num_tasks: None,
            task_usage_stat: None,
            task_to_job: HashMap::new(),
            job_num_tasks: HashMap::new(),
            task_to_runtime: HashMap::new(),
            shut_down: false,
        };
        if !enabled {
            return Ok(emitter);
        }

        let open = |dir: &str, file: &str| -> Result<BufWriter<File>, TraceError> {
            let dir_path = root.join(dir);
            fs::create_dir_all(&dir_path)?;
            Ok(BufWriter::new(File::create(dir_path.join(file))?))
        };
        emitter.machine_events = Some(open("machine_events", "part-00000-of-00001.csv")?);
        emitter.scheduler_events = Some(open("scheduler_events", "scheduler_events.csv")?);
        emitter.task_events = Some(open("task_events", "part-00000-of-00500.csv")?);
        emitter.task_runtime_events = Some(open("task_runtime_events", "task_runtime_events.csv")?);
        emitter.jobs_num_tasks = Some(open("jobs_num_tasks", "jobs_num_tasks.csv")?);
        emitter.task_usage_stat = Some(open("task_usage_stat", "task_usage_stat.csv")?);
        Ok(emitter)
    }

    /// Trace id of a machine: simulation prefix suffix, or a seeded hash of
    /// the resource UUID. Malformed simulation names are fatal.
    pub fn machine_id(rd: &ResourceDescriptor) -> u64 {
        if let Some(suffix) = rd.friendly_name.strip_prefix(SIMULATION_MACHINE_PREFIX) {
            return suffix
                .parse()
                .unwrap_or_else(|_| panic!("could not convert: {}", rd.friendly_name));
        }
        hash_combine(TRACE_ID_SEED, stable_hash_u64(rd.id.as_bytes()))
    }

    fn job_trace_ids(jd: &JobDescriptor, td: &TaskDescriptor) -> (u64, u64) {
        if let Some(suffix) = jd.name.strip_prefix(SIMULATION_JOB_PREFIX) {
            let job_id: u64 = suffix
                .parse()
                .unwrap_or_else(|_| panic!("could not convert: {}", jd.name));
            // Simulated jobs address tasks by their index within the job.
            (job_id, td.index)
        } else {
            let job_id = hash_combine(TRACE_ID_SEED, stable_hash_u64(jd.name.as_bytes()));
            (job_id, td.id)
        }
    }

    fn write_row(stream: &mut Option<BufWriter<File>>, row: &str) {
        if let Some(writer) = stream {
            if let Err(e) = writer.write_all(row.as_bytes()) {
                warn!("Dropping trace row: {}", e);
            }
        }
    }

    pub fn add_machine(&mut self, rd: &ResourceDescriptor) {
        if !self.enabled {
            return;
        }
        let timestamp = self.time.now_us();
        let machine_id = Self::machine_id(rd);
        Self::write_row(
            &mut self.machine_events,
            &format!("{timestamp},{machine_id},{MACHINE_ADD},,,\n"),
        );
    }

    pub fn remove_machine(&mut self, rd: &ResourceDescriptor) {
        if !self.enabled {
            return;
        }
        let timestamp = self.time.now_us();
        let machine_id = Self::machine_id(rd);
        Self::write_row(
            &mut self.machine_events,
            &format!("{timestamp},{machine_id},{MACHINE_REMOVE},,,\n"),
        );
    }

    pub fn scheduler_run(&mut self, stats: &SchedulerRunStats, graph_change_stats: &str) {
        if !self.enabled {
            return;
        }
        let timestamp = self.time.now_us();
        Self::write_row(
            &mut self.scheduler_events,
            &format!(
                "{},{},{},{},{}\n",
                timestamp,
                stats.scheduler_runtime_us,
                stats.algorithm_runtime_us,
                stats.total_runtime_us,
                graph_change_stats
            ),
        );
    }

    pub fn task_submitted(&mut self, jd: &JobDescriptor, td: &TaskDescriptor) {
        if !self.enabled {
            return;
        }
        let timestamp = self.time.now_us();
        let (job_id, trace_task_id) = Self::job_trace_ids(jd, td);

        // Keyed by the scheduler task id; later events only carry that.
        if self.task_to_job.insert(td.id, job_id).is_none() {
            *self.job_num_tasks.entry(job_id).or_insert(0) += 1;
        }
        self.task_to_runtime.entry(td.id).or_insert(TaskRuntime {
            trace_task_id,
            start_time: timestamp,
            ..TaskRuntime::default()
        });
        Self::write_row(
            &mut self.task_events,
            &format!("{timestamp},,{job_id},{trace_task_id},{TASK_SUBMIT},,,,,,,\n"),
        );
    }

    fn task_event_row(&mut self, task: TaskId, event: i32) -> (u64, u64) {
        let timestamp = self.time.now_us();
        let job_id = *self
            .task_to_job
            .get(&task)
            .unwrap_or_else(|| panic!("task {task} was never submitted to the trace"));
        let trace_task_id = self
            .task_to_runtime
            .get(&task)
            .unwrap_or_else(|| panic!("task {task} has no runtime record"))
            .trace_task_id;
        Self::write_row(
            &mut self.task_events,
            &format!("{timestamp},,{job_id},{trace_task_id},{event},,,,,,,\n"),
        );
        (timestamp, job_id)
    }

    pub fn task_scheduled(&mut self, task: TaskId) {
        if !self.enabled {
            return;
        }
        let (timestamp, _) = self.task_event_row(task, TASK_SCHEDULE);
        let tr = self.task_to_runtime.get_mut(&task).expect("checked above");
        assert!(
            !tr.running,
            "task {task} scheduled twice without a terminal event in between"
        );
        tr.running = true;
        tr.num_runs += 1;
        tr.last_schedule_time = timestamp;
    }

    pub fn task_evicted(&mut self, task: TaskId) {
        if !self.enabled {
            return;
        }
        let (timestamp, _) = self.task_event_row(task, TASK_EVICT);
        let tr = self.task_to_runtime.get_mut(&task).expect("checked above");
        tr.total_runtime += timestamp - tr.last_schedule_time;
        tr.running = false;
    }

    pub fn task_failed(&mut self, task: TaskId) {
        if !self.enabled {
            return;
        }
        let (timestamp, _) = self.task_event_row(task, TASK_FAIL);
        let tr = self.task_to_runtime.get_mut(&task).expect("checked above");
        tr.total_runtime += timestamp - tr.last_schedule_time;
        tr.running = false;
    }

    pub fn task_completed(&mut self, task: TaskId) {
        if !self.enabled {
            return;
        }
        let (timestamp, _) = self.task_event_row(task, TASK_COMPLETE);
        let tr = self.task_to_runtime.get_mut(&task).expect("checked above");
        tr.total_runtime += timestamp - tr.last_schedule_time;
        tr.runtime = timestamp - tr.last_schedule_time;
        tr.running = false;
    }

    pub fn task_killed(&mut self, task: TaskId) {
        if !self.enabled {
            return;
        }
        let (timestamp, _) = self.task_event_row(task, TASK_KILL);
        let tr = self.task_to_runtime.get_mut(&task).expect("checked above");
        tr.total_runtime += timestamp - tr.last_schedule_time;
        tr.running = false;
    }

    /// Flushes the accumulated runtime and per-job counts. Idempotent; also
    /// invoked from `Drop`.
    pub fn shutdown(&mut self) {
        if !self.enabled || self.shut_down {
            return;
        }
        self.shut_down = true;

        let mut tasks: Vec<(&TaskId, &TaskRuntime)> = self.task_to_runtime.iter().collect();
        tasks.sort_by_key(|(id, _)| **id);
        for (task, tr) in tasks {
            let job_id = match self.task_to_job.get(task) {
                Some(id) => *id,
                None => panic!("task {task} has a runtime record but no job"),
            };
            // The job id doubles as the job's logical name.
            Self::write_row(
                &mut self.task_runtime_events,
                &format!(
                    "{},{},{},{},{},{},{}\n",
                    job_id,
                    tr.trace_task_id,
                    job_id,
                    tr.start_time,
                    tr.total_runtime,
                    tr.runtime,
                    tr.num_runs
                ),
            );
        }

        let mut jobs: Vec<(&u64, &u64)> = self.job_num_tasks.iter().collect();
        jobs.sort_by_key(|(id, _)| **id);
        for (job, num_tasks) in jobs {
            Self::write_row(&mut self.jobs_num_tasks, &format!("{job},{num_tasks}\n"));
        }

        for stream in [
            &mut self.machine_events,
            &mut self.scheduler_events,
            &mut self.task_events,
            &mut self.task_runtime_events,
            &mut self.jobs_num_tasks,
            &mut self.task_usage_stat,
        ] {
            if let Some(writer) = stream {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush trace stream: {}", e);
                }
            }
        }
    }
}

impl Drop for TraceEmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use uuid::Uuid;
    use watershed_core::time::SimulatedClock;
    use watershed_core::types::{JobState, ResourceKind, TaskState};

    fn descriptor(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceKind::Machine, name)
    }

    fn job_and_task(job_name: &str, task_id: TaskId, index: u64) -> (JobDescriptor, TaskDescriptor) {
        let mut jd = JobDescriptor::new(Uuid::new_v4(), job_name);
        jd.state = JobState::Running;
        let mut td = TaskDescriptor::new(task_id, jd.id, format!("{job_name}/{index}"), index);
        td.state = TaskState::Runnable;
        jd.tasks.push(task_id);
        (jd, td)
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    #[test]
    fn disabled_emitter_writes_nothing() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(0));
        let mut emitter = TraceEmitter::new(false, dir.path(), clock).unwrap();
        emitter.add_machine(&descriptor("m0"));
        emitter.shutdown();
        assert!(!dir.path().join("machine_events").exists());
    }

    #[test]
    fn machine_events_use_codes_zero_and_one() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(500));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock).unwrap();
        let rd = descriptor("m0");
        emitter.add_machine(&rd);
        emitter.remove_machine(&rd);
        emitter.shutdown();

        let rows = read(dir.path(), "machine_events/part-00000-of-00001.csv");
        let id = TraceEmitter::machine_id(&rd);
        assert_eq!(rows, format!("500,{id},0,,,\n500,{id},1,,,\n"));
    }

    #[test]
    fn simulation_machine_names_carry_their_trace_id() {
        let rd = descriptor("watershed_simulation_machine_31337");
        assert_eq!(TraceEmitter::machine_id(&rd), 31337);
    }

    #[test]
    #[should_panic(expected = "could not convert")]
    fn malformed_simulation_machine_name_is_fatal() {
        let rd = descriptor("watershed_simulation_machine_not_a_number");
        TraceEmitter::machine_id(&rd);
    }

    #[test]
    fn hash_derived_machine_ids_are_stable() {
        let rd = descriptor("ordinary-machine");
        assert_eq!(TraceEmitter::machine_id(&rd), TraceEmitter::machine_id(&rd));
        let other = descriptor("ordinary-machine");
        // Different UUID, different id.
        assert_ne!(TraceEmitter::machine_id(&rd), TraceEmitter::machine_id(&other));
    }

    #[test]
    fn task_lifecycle_rows_and_runtime_accumulation() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(1000));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock.clone()).unwrap();

        let (jd, td) = job_and_task("watershed_simulation_job_7", 42, 42);
        emitter.task_submitted(&jd, &td);
        clock.set(1500);
        emitter.task_scheduled(42);
        clock.set(3500);
        emitter.task_completed(42);
        emitter.shutdown();

        let events = read(dir.path(), "task_events/part-00000-of-00500.csv");
        assert_eq!(
            events,
            "1000,,7,42,0,,,,,,,\n1500,,7,42,1,,,,,,,\n3500,,7,42,4,,,,,,,\n"
        );

        let runtimes = read(dir.path(), "task_runtime_events/task_runtime_events.csv");
        assert_eq!(runtimes, "7,42,7,1000,2000,2000,1\n");

        let num_tasks = read(dir.path(), "jobs_num_tasks/jobs_num_tasks.csv");
        assert_eq!(num_tasks, "7,1\n");
    }

    #[test]
    fn eviction_accumulates_runtime_across_runs() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(0));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock.clone()).unwrap();

        let (jd, td) = job_and_task("watershed_simulation_job_1", 5, 0);
        emitter.task_submitted(&jd, &td);
        clock.set(100);
        emitter.task_scheduled(5);
        clock.set(300);
        emitter.task_evicted(5);
        clock.set(400);
        emitter.task_scheduled(5);
        clock.set(1000);
        emitter.task_completed(5);
        emitter.shutdown();

        // 200us of first run + 600us of second; last runtime is 600.
        let runtimes = read(dir.path(), "task_runtime_events/task_runtime_events.csv");
        assert_eq!(runtimes, "1,0,1,0,800,600,2\n");
    }

    #[test]
    #[should_panic(expected = "scheduled twice")]
    fn second_schedule_without_terminal_event_is_rejected() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(0));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock).unwrap();
        let (jd, td) = job_and_task("watershed_simulation_job_1", 5, 0);
        emitter.task_submitted(&jd, &td);
        emitter.task_scheduled(5);
        emitter.task_scheduled(5);
    }

    #[test]
    fn resubmission_does_not_double_count_job_tasks() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(0));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock).unwrap();
        let (jd, td) = job_and_task("watershed_simulation_job_3", 9, 0);
        emitter.task_submitted(&jd, &td);
        emitter.task_submitted(&jd, &td);
        emitter.shutdown();
        let num_tasks = read(dir.path(), "jobs_num_tasks/jobs_num_tasks.csv");
        assert_eq!(num_tasks, "3,1\n");
    }

    #[test]
    fn scheduler_runs_append_stats_rows() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new(777));
        let mut emitter = TraceEmitter::new(true, dir.path(), clock).unwrap();
        let stats = SchedulerRunStats {
            scheduler_runtime_us: 10,
            algorithm_runtime_us: 20,
            total_runtime_us: 30,
        };
        emitter.scheduler_run(&stats, "nodes_added=4");
        emitter.shutdown();
        let rows = read(dir.path(), "scheduler_events/scheduler_events.csv");
        assert_eq!(rows, "777,10,20,30,nodes_added=4\n");
    }
}
