use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use watershed_core::config::WatershedConfig;
use watershed_core::error::CoreError;
use watershed_core::registry::{
    new_job_map, new_resource_map, new_task_map, runnable_tasks_for_job, JobMap, ResourceMap,
    TaskMap,
};
use watershed_core::stats::{new_runtime_stats, SharedRuntimeStats};
use watershed_core::time::TimeSource;
use watershed_core::types::{
    JobDescriptor, JobId, JobState, ResourceId, ResourceKind, ResourceTopologyNode, TaskDescriptor,
    TaskId, TaskState,
};
use watershed_flow::cost_model::{create_cost_model, new_leaf_set, CostModelContext};
use watershed_flow::delta::{DeltaKind, SchedulingDelta};
use watershed_flow::dispatcher::{ProcessSolver, SolverBackend, SolverDispatcher};
use watershed_flow::flow_graph::FlowGraph;
use watershed_flow::graph::FlowNodeKind;
use watershed_trace::{SchedulerRunStats, TraceEmitter, TraceError};

use crate::executor::{Executor, KillReason};

/// Quincy-style min-cost-flow scheduler driver.
///
/// All scheduling state lives behind one coarse mutex; every public entry
/// point locks at its outermost frame and delegates to `*_locked` methods on
/// the state, so mutations are serialized and timestamps observe lock order.
/// The solver call is the only long-held critical section.
pub struct FlowScheduler {
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    config: WatershedConfig,
    task_map: TaskMap,
    job_map: JobMap,
    resource_map: ResourceMap,
    runtime_stats: SharedRuntimeStats,
    time: Arc<dyn TimeSource>,
    flow_graph: FlowGraph,
    dispatcher: SolverDispatcher,
    executor: Box<dyn Executor>,
    trace: TraceEmitter,
    task_bindings: HashMap<TaskId, ResourceId>,
    task_start_times: HashMap<TaskId, u64>,
    jobs_to_schedule: HashSet<JobId>,
    /// Descendant resource ids per registered machine, for registry cleanup.
    machine_resources: HashMap<ResourceId, Vec<ResourceId>>,
    last_updated_time_dependent_costs: u64,
    /// Deltas the last iterations failed to action, kept for diagnostics.
    unactioned_deltas: Vec<SchedulingDelta>,
}

impl FlowScheduler {
    /// Builds the scheduler around the configured cost model and an explicit
    /// solver backend. The topology root (usually a bare coordinator node)
    /// is installed immediately; machines join via `register_resource`.
    pub fn new(
        config: WatershedConfig,
        topology_root: ResourceTopologyNode,
        executor: Box<dyn Executor>,
        solver: Box<dyn SolverBackend>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, CoreError> {
        let cost_model_kind = config.scheduler.cost_model_kind()?;
        let task_map = new_task_map();
        let job_map = new_job_map();
        let resource_map = new_resource_map();
        let runtime_stats = new_runtime_stats();
        let leaf_ids = new_leaf_set();

        let ctx = CostModelContext {
            task_map: task_map.clone(),
            job_map: job_map.clone(),
            resource_map: resource_map.clone(),
            leaf_ids: leaf_ids.clone(),
            runtime_stats: runtime_stats.clone(),
            time: time.clone(),
            max_arc_cost: config.scheduler.max_arc_cost,
        };
        let cost_model = create_cost_model(cost_model_kind, &ctx, &config.sim_quincy);
        let flow_graph = FlowGraph::new(
            cost_model,
            task_map.clone(),
            leaf_ids,
            config.scheduler.max_arc_cost,
        );

        let trace = TraceEmitter::new(
            config.scheduler.generate_trace,
            &config.scheduler.generated_trace_path,
            time.clone(),
        )
        .map_err(|e| match e {
            TraceError::Io(io) => CoreError::Io(io),
        })?;
        if config.scheduler.debug_cost_model {
            std::fs::create_dir_all(&config.scheduler.debug_output_dir)?;
        }

        let mut state = SchedulerState {
            config,
            task_map,
            job_map,
            resource_map,
            runtime_stats,
            time,
            flow_graph,
            dispatcher: SolverDispatcher::new(solver),
            executor,
            trace,
            task_bindings: HashMap::new(),
            task_start_times: HashMap::new(),
            jobs_to_schedule: HashSet::new(),
            machine_resources: HashMap::new(),
            last_updated_time_dependent_costs: 0,
            unactioned_deltas: Vec::new(),
        };
        state.install_topology(topology_root);
        info!(
            "Flow scheduler initiated with the {} cost model",
            cost_model_kind
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Convenience constructor wiring the configured external solver binary.
    pub fn with_process_solver(
        config: WatershedConfig,
        topology_root: ResourceTopologyNode,
        executor: Box<dyn Executor>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, CoreError> {
        let solver = Box::new(ProcessSolver::new(
            config.scheduler.solver_path.clone(),
            config.scheduler.solver_args.clone(),
        ));
        Self::new(config, topology_root, executor, solver, time)
    }

    // ── Resource lifecycle ──────────────────────────────────────────

    /// Registers a machine subtree: the flow graph learns the topology
    /// first, then the executor initializes the resource.
    pub fn register_resource(&self, subtree: ResourceTopologyNode, local: bool, simulated: bool) {
        let mut s = self.state.lock().unwrap();
        s.register_resource_locked(subtree, local, simulated);
    }

    /// Deregisters a machine. The executor is torn down first; the flow
    /// graph update comes last, returning any unbound tasks to the queue.
    pub fn deregister_resource(&self, machine: ResourceId) {
        let mut s = self.state.lock().unwrap();
        s.deregister_resource_locked(machine);
    }

    // ── Job lifecycle ───────────────────────────────────────────────

    /// Admits a job with its tasks; they become runnable immediately and the
    /// job is queued for the next scheduling run.
    pub fn submit_job(&self, job: JobDescriptor, tasks: Vec<TaskDescriptor>) {
        let mut s = self.state.lock().unwrap();
        s.submit_job_locked(job, tasks);
    }

    pub fn handle_job_completion(&self, job: JobId) {
        let mut s = self.state.lock().unwrap();
        s.handle_job_completion_locked(job);
    }

    /// Schedules every queued job in one solver run. Returns the number of
    /// newly placed tasks.
    pub fn schedule_all_jobs(&self) -> u64 {
        let mut s = self.state.lock().unwrap();
        let mut job_ids: Vec<JobId> = s.jobs_to_schedule.iter().copied().collect();
        job_ids.sort();
        let jobs = s.clone_job_descriptors(&job_ids);
        let num_scheduled = s.schedule_jobs_locked(&jobs);
        s.jobs_to_schedule.clear();
        num_scheduled
    }

    /// Schedules the given jobs in one atomic step: resource statistics are
    /// refreshed, job nodes added or updated, the iteration run, and job
    /// nodes updated again to reflect any reservation changes.
    pub fn schedule_jobs(&self, job_ids: &[JobId]) -> u64 {
        let mut s = self.state.lock().unwrap();
        let jobs = s.clone_job_descriptors(job_ids);
        let num_scheduled = s.schedule_jobs_locked(&jobs);
        for id in job_ids {
            s.jobs_to_schedule.remove(id);
        }
        num_scheduled
    }

    // ── Task event handlers ─────────────────────────────────────────

    pub fn handle_task_placement(&self, task: TaskId, resource: ResourceId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_placement_locked(task, resource);
    }

    pub fn handle_task_eviction(&self, task: TaskId, resource: ResourceId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_eviction_locked(task, resource);
    }

    pub fn handle_task_failure(&self, task: TaskId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_failure_locked(task);
    }

    pub fn handle_task_completion(&self, task: TaskId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_completion_locked(task);
    }

    pub fn handle_task_migration(&self, task: TaskId, to: ResourceId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_migration_locked(task, to);
    }

    /// Kill-and-reschedule is the strongest preemption supported; a killed
    /// task is gone for good.
    pub fn kill_running_task(&self, task: TaskId) {
        let mut s = self.state.lock().unwrap();
        s.handle_task_killed_locked(task);
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        let s = self.state.lock().unwrap();
        let tasks = s.task_map.read().unwrap();
        tasks.get(&task).map(|td| td.state)
    }

    pub fn task_binding(&self, task: TaskId) -> Option<ResourceId> {
        let s = self.state.lock().unwrap();
        s.task_bindings.get(&task).copied()
    }

    pub fn num_leaf_resources(&self) -> usize {
        let s = self.state.lock().unwrap();
        let resources = s.resource_map.read().unwrap();
        resources.values().filter(|rd| rd.kind.is_assignable()).count()
    }

    pub fn unactioned_deltas(&self) -> Vec<SchedulingDelta> {
        let s = self.state.lock().unwrap();
        s.unactioned_deltas.clone()
    }

    /// Flushes the trace streams. Honored only between iterations; an
    /// in-flight solver run completes first by way of the lock.
    pub fn shutdown(&self) {
        let mut s = self.state.lock().unwrap();
        s.trace.shutdown();
    }
}

impl SchedulerState {
    fn install_topology(&mut self, root: ResourceTopologyNode) {
        self.record_subtree_resources(&root);
        self.flow_graph.add_resource_topology(&root);
        let mut machines = Vec::new();
        root.visit(&mut |node| {
            if node.descriptor.kind == ResourceKind::Machine {
                machines.push(node.clone());
            }
        });
        for machine in machines {
            self.machine_resources.insert(
                machine.descriptor.id,
                machine.leaf_ids().into_iter().chain([machine.descriptor.id]).collect(),
            );
            self.executor.initialize_resource(&machine.descriptor, true, false);
            self.trace.add_machine(&machine.descriptor);
        }
        self.update_cost_model_resource_stats();
    }

    fn record_subtree_resources(&mut self, subtree: &ResourceTopologyNode) {
        let mut resources = self.resource_map.write().unwrap();
        subtree.visit(&mut |node| {
            resources.insert(node.descriptor.id, node.descriptor.clone());
        });
    }

    fn register_resource_locked(
        &mut self,
        subtree: ResourceTopologyNode,
        local: bool,
        simulated: bool,
    ) {
        assert_eq!(
            subtree.descriptor.kind,
            ResourceKind::Machine,
            "resources register machine subtrees"
        );
        let machine = subtree.descriptor.id;
        info!("Registering machine {} ({})", machine, subtree.descriptor.friendly_name);

        self.record_subtree_resources(&subtree);
        let mut descendants: Vec<ResourceId> = Vec::new();
        subtree.visit(&mut |node| descendants.push(node.descriptor.id));
        self.machine_resources.insert(machine, descendants);

        // Flow graph first, executor second.
        if let Err(e) = self.flow_graph.add_machine(&subtree) {
            error!("Could not add machine {} to the flow graph: {}", machine, e);
            return;
        }
        self.update_cost_model_resource_stats();
        self.executor
            .initialize_resource(&subtree.descriptor, local, simulated);
        self.trace.add_machine(&subtree.descriptor);
    }

    fn deregister_resource_locked(&mut self, machine: ResourceId) {
        info!("Deregistering machine {}", machine);
        let descriptor = {
            let resources = self.resource_map.read().unwrap();
            resources.get(&machine).cloned()
        };

        self.executor.teardown_resource(machine);
        if let Some(rd) = &descriptor {
            self.trace.remove_machine(rd);
        }

        // The flow graph update comes last.
        let evicted = match self.flow_graph.remove_machine(machine) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Could not remove machine {}: {}", machine, e);
                return;
            }
        };
        for task in evicted {
            self.task_bindings.remove(&task);
            self.task_start_times.remove(&task);
            let job_id = {
                let tasks = self.task_map.read().unwrap();
                tasks.get(&task).map(|td| td.job_id)
            };
            let Some(job_id) = job_id else {
                continue;
            };
            let job_terminal = {
                let jobs = self.job_map.read().unwrap();
                jobs.get(&job_id).map(|jd| jd.state.is_terminal()).unwrap_or(false)
            };
            if job_terminal {
                // The owning job already finished; the orphan has nowhere to
                // re-queue, so it fails instead.
                {
                    let mut tasks = self.task_map.write().unwrap();
                    if let Some(td) = tasks.get_mut(&task) {
                        td.state = TaskState::Failed;
                    }
                }
                self.trace.task_failed(task);
                self.flow_graph.task_failed(task);
            } else {
                {
                    let mut tasks = self.task_map.write().unwrap();
                    if let Some(td) = tasks.get_mut(&task) {
                        td.state = TaskState::Runnable;
                    }
                }
                self.jobs_to_schedule.insert(job_id);
                self.trace.task_evicted(task);
            }
        }

        if let Some(descendants) = self.machine_resources.remove(&machine) {
            let mut resources = self.resource_map.write().unwrap();
            for id in descendants {
                resources.remove(&id);
            }
        }
    }

    fn submit_job_locked(&mut self, mut job: JobDescriptor, tasks: Vec<TaskDescriptor>) {
        let now = self.time.now_us();
        info!("Job {} submitted with {} tasks", job.id, tasks.len());
        if job.tasks.is_empty() {
            job.tasks = tasks.iter().map(|td| td.id).collect();
        }
        {
            let mut task_registry = self.task_map.write().unwrap();
            for mut td in tasks {
                assert_eq!(td.job_id, job.id, "task {} submitted under the wrong job", td.id);
                td.state = TaskState::Runnable;
                td.submit_time_us = now;
                self.trace.task_submitted(&job, &td);
                task_registry.insert(td.id, td);
            }
        }
        self.jobs_to_schedule.insert(job.id);
        self.job_map.write().unwrap().insert(job.id, job);
    }

    fn clone_job_descriptors(&self, job_ids: &[JobId]) -> Vec<JobDescriptor> {
        let jobs = self.job_map.read().unwrap();
        job_ids.iter().filter_map(|id| jobs.get(id).cloned()).collect()
    }

    fn schedule_jobs_locked(&mut self, jobs: &[JobDescriptor]) -> u64 {
        info!("START SCHEDULING {} jobs", jobs.len());
        // Resource statistics feed arc costs, so they must be current before
        // job nodes are added below.
        self.update_cost_model_resource_stats();

        let mut run_scheduler = false;
        for job in jobs {
            if !runnable_tasks_for_job(job, &self.task_map).is_empty() {
                self.flow_graph.add_or_update_job_nodes(job);
                run_scheduler = true;
            }
        }
        if !run_scheduler {
            info!("STOP SCHEDULING, no runnable tasks");
            return 0;
        }

        let num_scheduled = self.run_scheduling_iteration();
        info!("STOP SCHEDULING, placed {} tasks", num_scheduled);
        if self.config.scheduler.debug_cost_model {
            self.log_debug_cost_model();
        }

        // Reservations may have changed during delta application, so job
        // nodes are brought up to date before returning.
        let fresh = self.clone_job_descriptors(&jobs.iter().map(|j| j.id).collect::<Vec<_>>());
        for job in &fresh {
            self.flow_graph.add_or_update_job_nodes(job);
        }
        num_scheduled
    }

    fn run_scheduling_iteration(&mut self) -> u64 {
        // The first iteration ever must see correct statistics.
        if self.dispatcher.seq_num() == 0 {
            self.update_cost_model_resource_stats();
        }

        let now = self.time.now_us();
        let refresh_due = now.saturating_sub(self.last_updated_time_dependent_costs)
            >= self.config.scheduler.time_dependent_cost_update_frequency;
        if refresh_due {
            let active: Vec<JobDescriptor> = {
                let jobs = self.job_map.read().unwrap();
                jobs.values().filter(|jd| !jd.state.is_terminal()).cloned().collect()
            };
            let refs: Vec<&JobDescriptor> = active.iter().collect();
            debug!("Updating time-dependent costs for {} jobs", refs.len());
            self.flow_graph.update_time_dependent_costs(&refs);
            self.last_updated_time_dependent_costs = now;
        }

        let iteration_start = Instant::now();
        let mapping = match self.dispatcher.run(self.flow_graph.model()) {
            Ok(mapping) => mapping,
            Err(e) => {
                error!("Solver run failed, no tasks placed this round: {}", e);
                return 0;
            }
        };
        let algorithm_runtime_us = iteration_start.elapsed().as_micros() as u64;

        let mut deltas: Vec<SchedulingDelta> = Vec::new();
        for (src, dst) in mapping {
            let src_node = self
                .flow_graph
                .model()
                .node(src)
                .unwrap_or_else(|| panic!("solver mapped unknown node {src}"));
            let dst_node = self
                .flow_graph
                .model()
                .node(dst)
                .unwrap_or_else(|| panic!("solver mapped unknown node {dst}"));
            assert!(
                src_node.kind.is_task(),
                "mapping source {} is a {:?}, not a task node",
                src,
                src_node.kind
            );
            assert!(
                dst_node.kind == FlowNodeKind::Pu,
                "mapping destination {} is a {:?}, not a PU",
                dst,
                dst_node.kind
            );
            let task = src_node.task.expect("task node carries a task id");
            let resource = dst_node.resource.expect("PU node carries a resource id");
            debug!("Bind task {} to {}", task, resource);
            self.dispatcher
                .node_binding_to_scheduling_delta(task, resource, &self.task_bindings, &mut deltas);
        }

        let num_scheduled = self.apply_scheduling_deltas(&mut deltas);

        deltas.retain(|d| !d.actioned && !matches!(d.kind, DeltaKind::NoOp));
        if !deltas.is_empty() {
            warn!("Not all deltas were processed, {} remain:", deltas.len());
            for delta in &deltas {
                warn!(" * {}", delta);
            }
            self.unactioned_deltas.extend(deltas);
        }

        // Delta application may have changed relevant statistics.
        self.update_cost_model_resource_stats();

        let total_runtime_us = iteration_start.elapsed().as_micros() as u64;
        let stats = SchedulerRunStats {
            scheduler_runtime_us: total_runtime_us - algorithm_runtime_us,
            algorithm_runtime_us,
            total_runtime_us,
        };
        let changes = self.flow_graph.take_change_stats();
        self.trace.scheduler_run(&stats, &changes.to_string());

        num_scheduled
    }

    fn apply_scheduling_deltas(&mut self, deltas: &mut [SchedulingDelta]) -> u64 {
        debug!("Applying {} scheduling deltas", deltas.len());
        let mut num_scheduled = 0;
        for delta in deltas.iter_mut() {
            match delta.kind {
                DeltaKind::NoOp => continue,
                DeltaKind::Place { task, resource } => {
                    self.handle_task_placement_locked(task, resource);
                    num_scheduled += 1;
                    delta.actioned = true;
                }
                DeltaKind::Preempt { task, resource } => {
                    self.handle_task_eviction_locked(task, resource);
                    delta.actioned = true;
                }
                DeltaKind::Migrate { task, to, .. } => {
                    self.handle_task_migration_locked(task, to);
                    delta.actioned = true;
                }
            }
        }
        num_scheduled
    }

    fn handle_task_placement_locked(&mut self, task: TaskId, resource: ResourceId) {
        self.executor.place(task, resource);
        self.task_bindings.insert(task, resource);
        self.task_start_times.insert(task, self.time.now_us());
        let job_id = {
            let mut tasks = self.task_map.write().unwrap();
            let td = tasks
                .get_mut(&task)
                .unwrap_or_else(|| panic!("placed task {task} missing from the registry"));
            td.state = TaskState::Running;
            td.job_id
        };
        {
            let mut jobs = self.job_map.write().unwrap();
            if let Some(jd) = jobs.get_mut(&job_id) {
                if jd.state != JobState::Running {
                    jd.state = JobState::Running;
                }
            }
        }
        self.trace.task_scheduled(task);
        self.flow_graph.task_scheduled(task, resource);
    }

    fn handle_task_eviction_locked(&mut self, task: TaskId, resource: ResourceId) {
        // The task is stopped but not failed; it re-queues as runnable.
        self.executor.kill(task, KillReason::Preemption);
        self.task_bindings.remove(&task);
        self.task_start_times.remove(&task);
        {
            let mut tasks = self.task_map.write().unwrap();
            if let Some(td) = tasks.get_mut(&task) {
                td.state = TaskState::Runnable;
                self.jobs_to_schedule.insert(td.job_id);
            }
        }
        self.trace.task_evicted(task);
        self.flow_graph.task_evicted(task, resource);
    }

    fn handle_task_failure_locked(&mut self, task: TaskId) {
        warn!("Task {} failed", task);
        self.task_bindings.remove(&task);
        self.task_start_times.remove(&task);
        {
            let mut tasks = self.task_map.write().unwrap();
            if let Some(td) = tasks.get_mut(&task) {
                td.state = TaskState::Failed;
            }
        }
        self.trace.task_failed(task);
        self.flow_graph.task_failed(task);
    }

    fn handle_task_completion_locked(&mut self, task: TaskId) {
        debug!("Task {} completed", task);
        self.task_bindings.remove(&task);
        let job_id = {
            let mut tasks = self.task_map.write().unwrap();
            let td = tasks
                .get_mut(&task)
                .unwrap_or_else(|| panic!("completed task {task} missing from the registry"));
            td.state = TaskState::Completed;
            td.job_id
        };

        // Final report: runtimes feed the per-class statistics the SJF and
        // Whare models read.
        let now = self.time.now_us();
        let runtime_us = self
            .task_start_times
            .remove(&task)
            .map(|start| now.saturating_sub(start))
            .unwrap_or(0);
        let equiv_classes = self.flow_graph.cost_model().task_equiv_classes(task);
        self.runtime_stats
            .write()
            .unwrap()
            .process_task_final_report(&equiv_classes, runtime_us);
        {
            let mut tasks = self.task_map.write().unwrap();
            if let Some(td) = tasks.get_mut(&task) {
                td.total_runtime_us += runtime_us;
            }
        }

        self.trace.task_completed(task);
        self.flow_graph.task_completed(task);

        if self.job_is_complete(job_id) {
            self.handle_job_completion_locked(job_id);
        }
    }

    fn handle_task_migration_locked(&mut self, task: TaskId, to: ResourceId) {
        // The old binding must be read before the base handler rebinds the
        // task; afterwards the lookup would return the new resource.
        let from = *self
            .task_bindings
            .get(&task)
            .unwrap_or_else(|| panic!("migrated task {task} has no binding"));
        self.executor.migrate(task, from, to);
        self.task_bindings.insert(task, to);
        self.flow_graph.task_migrated(task, from, to);
    }

    fn handle_task_killed_locked(&mut self, task: TaskId) {
        info!("Killing task {}", task);
        self.executor.kill(task, KillReason::Abort);
        self.task_bindings.remove(&task);
        self.task_start_times.remove(&task);
        {
            let mut tasks = self.task_map.write().unwrap();
            if let Some(td) = tasks.get_mut(&task) {
                td.state = TaskState::Aborted;
            }
        }
        self.trace.task_killed(task);
        self.flow_graph.task_killed(task);
    }

    fn handle_job_completion_locked(&mut self, job: JobId) {
        info!("Job {} completed", job);
        {
            let mut jobs = self.job_map.write().unwrap();
            if let Some(jd) = jobs.get_mut(&job) {
                jd.state = JobState::Completed;
            }
        }
        self.jobs_to_schedule.remove(&job);
        self.flow_graph.job_completed(job);
    }

    fn job_is_complete(&self, job: JobId) -> bool {
        let jobs = self.job_map.read().unwrap();
        let tasks = self.task_map.read().unwrap();
        let Some(jd) = jobs.get(&job) else {
            return false;
        };
        jd.tasks.iter().all(|id| {
            tasks
                .get(id)
                .map(|td| td.state == TaskState::Completed || td.state == TaskState::Failed)
                .unwrap_or(true)
        })
    }

    fn update_cost_model_resource_stats(&mut self) {
        if self.flow_graph.cost_model().uses_topology_stats() {
            debug!("Updating resource statistics in flow graph");
            self.flow_graph.compute_topology_statistics();
        } else {
            debug!("No resource stats update required");
        }
    }

    fn log_debug_cost_model(&mut self) {
        let path = self
            .config
            .scheduler
            .debug_output_dir
            .join(format!("cost_model_{}.csv", self.dispatcher.seq_num()));
        if let Err(e) = std::fs::write(&path, self.flow_graph.cost_model().debug_info_csv()) {
            warn!("Could not write cost model debug CSV {:?}: {}", path, e);
        }
    }
}

impl Drop for SchedulerState {
    fn drop(&mut self) {
        self.trace.shutdown();
    }
}
