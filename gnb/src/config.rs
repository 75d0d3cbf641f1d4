//! YAML Configuration Structures
//!
//! Layout of the DU scheduler driver configuration file. Cell entries use
//! the srsRAN-style field names (`common_scs`, `channel_bandwidth_MHz`) and
//! are converted into scheduler cell configurations at start-up.

use anyhow::{anyhow, Context, Result};
use common::{Bandwidth, DuCellIndex, SubcarrierSpacing};
use num_traits::FromPrimitive;
use scheduler::cell::TddPattern;
use scheduler::slicing::RanSliceConfig;
use scheduler::{CellConfiguration, SchedulerExpertConfig};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GnbConfig {
    /// Scheduler expert parameters, common to all cells
    #[serde(default)]
    pub expert_cfg: SchedulerExpertConfig,
    /// Served cells, indexed in declaration order
    pub cells: Vec<CellConfig>,
    /// UEs attached at start-up
    #[serde(default)]
    pub ues: Vec<UeConfig>,
    /// Emulated traffic and feedback
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Common subcarrier spacing in kHz
    pub common_scs: u32,
    /// Channel bandwidth in MHz
    #[serde(rename = "channel_bandwidth_MHz")]
    pub channel_bandwidth_mhz: u32,
    /// TDD pattern, FDD when absent
    #[serde(default)]
    pub tdd_ul_dl_cfg: Option<TddPattern>,
    /// CORESET configuration index
    #[serde(default)]
    pub coreset_index: Option<u8>,
    /// PDCCH to PDSCH delay
    #[serde(default)]
    pub k0: u8,
    /// PDCCH to PUSCH delays
    #[serde(default)]
    pub k2_candidates: Option<Vec<u8>>,
    /// PUCCH RBs at each edge of the UL band
    #[serde(default)]
    pub pucch_guard_rbs: Option<u16>,
    /// RAN slices, a single unbounded slice when empty
    #[serde(default)]
    pub slices: Vec<RanSliceConfig>,
}

/// UE attached at start-up
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct UeConfig {
    /// C-RNTI
    pub rnti: u16,
    /// Index of the serving cell in `cells`
    #[serde(default)]
    pub cell: u8,
    /// RAN slice of the UE
    #[serde(default)]
    pub slice: u8,
}

/// Emulated traffic and feedback
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// DL buffer state reported for every UE at each period
    #[serde(default = "default_dl_bytes")]
    pub dl_bytes: u32,
    /// UL buffer status reported for every UE at each period
    #[serde(default = "default_ul_bytes")]
    pub ul_bytes: u32,
    /// Buffer report period in milliseconds
    #[serde(default = "default_report_period_ms")]
    pub report_period_ms: u64,
    /// Every n-th HARQ feedback is negative, 0 disables
    #[serde(default)]
    pub nack_period: u32,
}

fn default_dl_bytes() -> u32 {
    100_000
}

fn default_ul_bytes() -> u32 {
    20_000
}

fn default_report_period_ms() -> u64 {
    10
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            dl_bytes: default_dl_bytes(),
            ul_bytes: default_ul_bytes(),
            report_period_ms: default_report_period_ms(),
            nack_period: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub all_level: String,
    /// Period of the scheduler statistics report in seconds
    #[serde(default = "default_stats_period_s")]
    pub stats_period_s: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_period_s() -> u64 {
    5
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            all_level: default_log_level(),
            stats_period_s: default_stats_period_s(),
        }
    }
}

impl CellConfig {
    pub fn scs(&self) -> Result<SubcarrierSpacing> {
        SubcarrierSpacing::from_u32(self.common_scs)
            .ok_or_else(|| anyhow!("Invalid subcarrier spacing: {} kHz", self.common_scs))
    }

    /// Build the scheduler configuration of the cell
    pub fn to_cell_configuration(&self, cell_index: DuCellIndex) -> Result<CellConfiguration> {
        let bandwidth = Bandwidth::from_mhz(self.channel_bandwidth_mhz)
            .ok_or_else(|| anyhow!("Invalid bandwidth: {} MHz", self.channel_bandwidth_mhz))?;

        let mut cfg = CellConfiguration::new(cell_index, self.scs()?, bandwidth);
        cfg.tdd = self.tdd_ul_dl_cfg;
        cfg.k0 = self.k0;
        if let Some(coreset_index) = self.coreset_index {
            cfg.coreset_index = coreset_index;
        }
        if let Some(k2_candidates) = &self.k2_candidates {
            cfg.k2_candidates = k2_candidates.clone();
        }
        if let Some(guard_rbs) = self.pucch_guard_rbs {
            cfg.pucch_guard_rbs = guard_rbs;
        }
        if !self.slices.is_empty() {
            cfg.slices = self.slices.clone();
        }
        Ok(cfg)
    }
}

impl GnbConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: GnbConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// All cells are ticked by one slot clock
    pub fn scs(&self) -> Result<SubcarrierSpacing> {
        let first = self.cells.first().ok_or_else(|| anyhow!("No cell configured"))?;
        first.scs()
    }

    fn validate(&self) -> Result<()> {
        let scs = self.scs()?;
        for (i, cell) in self.cells.iter().enumerate() {
            if cell.scs()? != scs {
                return Err(anyhow!(
                    "Cell {} uses {} kHz but the slot clock runs at {} kHz",
                    i,
                    cell.common_scs,
                    self.cells[0].common_scs
                ));
            }
        }
        for ue in &self.ues {
            if usize::from(ue.cell) >= self.cells.len() {
                return Err(anyhow!("UE rnti={:#x} served by unknown cell {}", ue.rnti, ue.cell));
            }
        }
        self.expert_cfg.validate()?;
        Ok(())
    }
}
