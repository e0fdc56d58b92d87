use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::EquivClass;

/// Accumulated runtime observations shared between the driver (writer) and
/// cost models (readers).
pub type SharedRuntimeStats = Arc<RwLock<RuntimeStats>>;

pub fn new_runtime_stats() -> SharedRuntimeStats {
    Arc::new(RwLock::new(RuntimeStats::default()))
}

#[derive(Debug, Default, Clone, Copy)]
struct RunningAvg {
    total_us: u64,
    samples: u64,
}

/// Per-equivalence-class task runtime averages, fed by final reports on task
/// completion. Cost models that estimate runtimes (SJF, Whare) read these.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    averages: HashMap<EquivClass, RunningAvg>,
}

impl RuntimeStats {
    /// Record a completed task's runtime against each of its equivalence
    /// classes.
    pub fn process_task_final_report(&mut self, equiv_classes: &[EquivClass], runtime_us: u64) {
        for ec in equiv_classes {
            let avg = self.averages.entry(*ec).or_default();
            avg.total_us += runtime_us;
            avg.samples += 1;
        }
    }

    /// Average observed runtime for an equivalence class, if any samples exist.
    pub fn average_runtime_us(&self, ec: EquivClass) -> Option<u64> {
        self.averages.get(&ec).map(|avg| avg.total_us / avg.samples)
    }

    pub fn num_classes(&self) -> usize {
        self.averages.len()
    }
}
