use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};

use watershed_core::config::SimulatedQuincyConfig;
use watershed_core::types::ResourceId;

pub type FileId = u64;
pub type NumBlocks = u64;

/// Simulated distributed filesystem backing the data-locality cost model.
/// Files carry a block count drawn from the configured distribution and are
/// replicated across machines; tasks sample input sets from it.
pub struct SimulatedDfs {
    rng: StdRng,
    files_per_machine: u64,
    replication_factor: u32,
    min_blocks_per_file: NumBlocks,
    max_blocks_per_file: NumBlocks,
    machines: Vec<ResourceId>,
    file_blocks: HashMap<FileId, NumBlocks>,
    file_machines: HashMap<FileId, Vec<ResourceId>>,
    machine_files: HashMap<ResourceId, HashSet<FileId>>,
    next_file: FileId,
}

impl SimulatedDfs {
    pub fn new(config: &SimulatedQuincyConfig) -> Self {
        Self::with_seed(config, rand::rng().random())
    }

    /// Deterministic variant for tests and repeatable simulations.
    pub fn with_seed(config: &SimulatedQuincyConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            files_per_machine: config.files_per_machine,
            replication_factor: config.replication_factor.max(1),
            min_blocks_per_file: config.min_blocks_per_file.max(1),
            max_blocks_per_file: config.max_blocks_per_file.max(config.min_blocks_per_file),
            machines: Vec::new(),
            file_blocks: HashMap::new(),
            file_machines: HashMap::new(),
            machine_files: HashMap::new(),
            next_file: 1,
        }
    }

    /// Draws a block count from the skewed file-size distribution; most files
    /// stay small, a few approach the maximum.
    fn sample_num_blocks(&mut self) -> NumBlocks {
        let span = (self.max_blocks_per_file - self.min_blocks_per_file) as f64;
        let r: f64 = self.rng.random();
        self.min_blocks_per_file + (span * r * r) as NumBlocks
    }

    /// Registers a machine and populates it with freshly generated files,
    /// replicated onto previously known machines.
    pub fn add_machine(&mut self, machine: ResourceId) {
        self.machines.push(machine);
        self.machine_files.entry(machine).or_default();
        for _ in 0..self.files_per_machine {
            let blocks = self.sample_num_blocks();
            let mut placement = vec![machine];
            let replicas = (self.replication_factor as usize - 1).min(self.machines.len() - 1);
            let others = self
                .machines
                .iter()
                .copied()
                .filter(|m| *m != machine)
                .choose_multiple(&mut self.rng, replicas);
            placement.extend(others);
            self.add_file(blocks, &placement);
        }
    }

    /// Inserts a file with an explicit placement; simulations use this to
    /// construct exact locality scenarios.
    pub fn add_file(&mut self, blocks: NumBlocks, machines: &[ResourceId]) -> FileId {
        let file = self.next_file;
        self.next_file += 1;
        self.file_blocks.insert(file, blocks);
        self.file_machines.insert(file, machines.to_vec());
        for machine in machines {
            self.machine_files.entry(*machine).or_default().insert(file);
        }
        file
    }

    /// Drops the machine's replicas; files with no remaining replica vanish.
    pub fn remove_machine(&mut self, machine: ResourceId) {
        self.machines.retain(|m| *m != machine);
        let files = self.machine_files.remove(&machine).unwrap_or_default();
        for file in files {
            if let Some(holders) = self.file_machines.get_mut(&file) {
                holders.retain(|m| *m != machine);
                if holders.is_empty() {
                    self.file_machines.remove(&file);
                    self.file_blocks.remove(&file);
                }
            }
        }
    }

    /// Samples a file set whose total block count lands within
    /// ±`tolerance_percent` of `target_blocks` (best effort when the
    /// filesystem holds too little data).
    pub fn sample_files(&mut self, target_blocks: NumBlocks, tolerance_percent: u32) -> HashSet<FileId> {
        let lower = (target_blocks.saturating_mul(100 - u64::from(tolerance_percent.min(100))) / 100)
            .max(target_blocks.min(1));
        let upper = target_blocks.saturating_mul(100 + u64::from(tolerance_percent)) / 100;

        let mut picked = HashSet::new();
        let mut total: NumBlocks = 0;
        let mut candidates: Vec<FileId> = self.file_blocks.keys().copied().collect();
        candidates.sort_unstable();

        while total < lower && !candidates.is_empty() {
            let idx = self.rng.random_range(0..candidates.len());
            let file = candidates.swap_remove(idx);
            let blocks = self.file_blocks[&file];
            // Skip files that would overshoot the window; they are already
            // consumed from the candidate pool, so the loop terminates.
            if total + blocks > upper {
                continue;
            }
            picked.insert(file);
            total += blocks;
        }
        picked
    }

    pub fn num_blocks(&self, file: FileId) -> NumBlocks {
        self.file_blocks.get(&file).copied().unwrap_or(0)
    }

    pub fn machines_for(&self, file: FileId) -> &[ResourceId] {
        self.file_machines.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_files(&self) -> usize {
        self.file_blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn dfs() -> SimulatedDfs {
        SimulatedDfs::with_seed(&SimulatedQuincyConfig::default(), 42)
    }

    #[test]
    fn adding_machines_populates_files() {
        let mut fs = dfs();
        fs.add_machine(Uuid::new_v4());
        fs.add_machine(Uuid::new_v4());
        assert_eq!(fs.num_files(), 16);
    }

    #[test]
    fn replicas_span_machines() {
        let mut fs = dfs();
        let machines: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for m in &machines {
            fs.add_machine(*m);
        }
        let replicated = fs
            .file_machines
            .values()
            .filter(|holders| holders.len() > 1)
            .count();
        assert!(replicated > 0);
    }

    #[test]
    fn removing_a_machine_drops_orphaned_files() {
        let mut fs = dfs();
        let machine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let solo = fs.add_file(4, &[machine]);
        let shared = fs.add_file(8, &[machine, other]);

        fs.remove_machine(machine);
        assert_eq!(fs.num_blocks(solo), 0);
        assert_eq!(fs.num_blocks(shared), 8);
        assert_eq!(fs.machines_for(shared), &[other]);
    }

    #[test]
    fn sampled_sets_respect_the_tolerance_window() {
        let mut fs = dfs();
        let machine = Uuid::new_v4();
        for _ in 0..50 {
            fs.add_file(4, &[machine]);
        }
        let set = fs.sample_files(40, 10);
        let total: u64 = set.iter().map(|f| fs.num_blocks(*f)).sum();
        assert!(total >= 36, "sampled only {total} blocks");
        assert!(total <= 44, "sampled {total} blocks");
    }

    #[test]
    fn sampling_an_empty_fs_returns_nothing() {
        let mut fs = dfs();
        assert!(fs.sample_files(100, 10).is_empty());
    }

    #[test]
    fn block_counts_stay_in_bounds() {
        let mut fs = dfs();
        fs.add_machine(Uuid::new_v4());
        for blocks in fs.file_blocks.values() {
            assert!(*blocks >= 1 && *blocks <= 64);
        }
    }
}
