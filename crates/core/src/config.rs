use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Cost;

/// Cost model selected by the `flow_scheduling_cost_model` value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CostModelKind {
    Trivial,
    Random,
    Sjf,
    Quincy,
    Whare,
    Coco,
    Octopus,
    Void,
    SimulatedQuincy,
}

impl CostModelKind {
    /// Maps the integer selector onto a kind. Unknown selectors are a
    /// configuration error, never a silent fallback.
    pub fn from_selector(selector: u32) -> Result<Self, CoreError> {
        match selector {
            0 => Ok(CostModelKind::Trivial),
            1 => Ok(CostModelKind::Random),
            2 => Ok(CostModelKind::Sjf),
            3 => Ok(CostModelKind::Quincy),
            4 => Ok(CostModelKind::Whare),
            5 => Ok(CostModelKind::Coco),
            6 => Ok(CostModelKind::Octopus),
            7 => Ok(CostModelKind::Void),
            8 => Ok(CostModelKind::SimulatedQuincy),
            other => Err(CoreError::Config(format!(
                "unknown flow scheduling cost model selector: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for CostModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostModelKind::Trivial => write!(f, "trivial"),
            CostModelKind::Random => write!(f, "random"),
            CostModelKind::Sjf => write!(f, "sjf"),
            CostModelKind::Quincy => write!(f, "quincy"),
            CostModelKind::Whare => write!(f, "whare"),
            CostModelKind::Coco => write!(f, "coco"),
            CostModelKind::Octopus => write!(f, "octopus"),
            CostModelKind::Void => write!(f, "void"),
            CostModelKind::SimulatedQuincy => write!(f, "simulated-quincy"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSchedulerConfig {
    /// Integer selector: 0 = trivial, 1 = random, 2 = SJF, 3 = Quincy,
    /// 4 = Whare, 5 = Coco, 6 = Octopus, 7 = void, 8 = simulated Quincy.
    pub flow_scheduling_cost_model: u32,
    /// Microseconds between refreshes of time-dependent arc costs.
    pub time_dependent_cost_update_frequency: u64,
    /// Upper bound on the magnitude of any arc cost.
    pub max_arc_cost: Cost,
    /// Write per-iteration cost model CSVs to `debug_output_dir`.
    pub debug_cost_model: bool,
    pub debug_output_dir: PathBuf,
    /// Enable the trace emitter.
    pub generate_trace: bool,
    /// Root directory for the generated trace CSVs.
    pub generated_trace_path: PathBuf,
    /// Min-cost max-flow solver binary and its arguments.
    pub solver_path: PathBuf,
    pub solver_args: Vec<String>,
}

impl Default for FlowSchedulerConfig {
    fn default() -> Self {
        Self {
            flow_scheduling_cost_model: 0,
            time_dependent_cost_update_frequency: 10_000_000,
            max_arc_cost: 100_000_000,
            debug_cost_model: false,
            debug_output_dir: PathBuf::from("."),
            generate_trace: false,
            generated_trace_path: PathBuf::from("trace"),
            solver_path: PathBuf::from("cs2"),
            solver_args: Vec::new(),
        }
    }
}

impl FlowSchedulerConfig {
    pub fn cost_model_kind(&self) -> Result<CostModelKind, CoreError> {
        CostModelKind::from_selector(self.flow_scheduling_cost_model)
    }
}

/// Parameters of the simulated-Quincy data locality model and its DFS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedQuincyConfig {
    /// Minimum fraction of a task's input blocks on a machine before a
    /// preference arc to that machine is emitted. In (0, 1].
    pub delta_preferred_machine: f64,
    /// Analogous threshold for rack aggregators. In (0, 1].
    pub delta_preferred_rack: f64,
    /// Per-block cost of a cross-rack transfer.
    pub core_transfer_cost: Cost,
    /// Per-block cost of an intra-rack, cross-machine transfer.
    pub tor_transfer_cost: Cost,
    /// Acceptable slack (percent) when sampling input block counts.
    pub percent_block_tolerance: u32,
    /// Cluster layout assumption used to assign machines to racks.
    pub machines_per_rack: u64,
    /// Files added to the simulated DFS per registered machine.
    pub files_per_machine: u64,
    /// Replication factor for simulated file blocks.
    pub replication_factor: u32,
    /// Block-count distribution bounds for simulated files.
    pub min_blocks_per_file: u64,
    pub max_blocks_per_file: u64,
    /// Mean number of input blocks sampled per task.
    pub mean_input_blocks: u64,
}

impl Default for SimulatedQuincyConfig {
    fn default() -> Self {
        Self {
            delta_preferred_machine: 0.1,
            delta_preferred_rack: 0.1,
            core_transfer_cost: 2,
            tor_transfer_cost: 1,
            percent_block_tolerance: 10,
            machines_per_rack: 16,
            files_per_machine: 8,
            replication_factor: 3,
            min_blocks_per_file: 1,
            max_blocks_per_file: 64,
            mean_input_blocks: 40,
        }
    }
}

/// Top-level configuration aggregating all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatershedConfig {
    #[serde(default)]
    pub scheduler: FlowSchedulerConfig,
    #[serde(default)]
    pub sim_quincy: SimulatedQuincyConfig,
}

/// Reads configuration from `path`; a missing or unparseable file yields the
/// defaults rather than an error.
pub fn load_config(path: &str) -> WatershedConfig {
    let Ok(contents) = std::fs::read_to_string(path) else {
        tracing::debug!("No config at {}, starting from defaults", path);
        return WatershedConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring unparseable config {}: {}", path, e);
            WatershedConfig::default()
        }
    }
}

/// Writes the configuration as TOML, creating missing parent directories.
pub fn save_config(config: &WatershedConfig, path: &str) -> anyhow::Result<()> {
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    tracing::debug!("Wrote config to {}", path.display());
    Ok(())
}
