//! Scheduler Configuration
//! 
//! Expert parameters shared by all cells and the per-cell configuration
//! established at cell bring-up.

use crate::cell::tdd::TddPattern;
use crate::slicing::RanSliceConfig;
use crate::{
    SchedError, MAX_DL_PDCCHS_PER_SLOT, MAX_K1_CANDIDATES, MAX_K2_CANDIDATES, MAX_PDSCHS_PER_SLOT,
    MAX_PUCCHS_PER_SLOT, MAX_PUSCHS_PER_SLOT, MAX_UL_PDCCHS_PER_SLOT, RING_ALLOCATOR_SIZE,
    SCHEDULER_MAX_K0, SCHEDULER_MAX_K1, SCHEDULER_MAX_K2,
};
use common::mcs::{mcs_description_qam64, SchMcsDescription};
use common::{
    Bandwidth, DuCellIndex, OfdmSymbolRange, RanSliceId, SchMcsIndex, SlotPoint, SubcarrierSpacing,
    MAX_NOF_DU_CELLS, MAX_NOF_DU_UES, MAX_NOF_PRBS, NOF_OFDM_SYMBOLS_PER_SLOT,
};
use serde::{Deserialize, Serialize};

/// Minimum number of UL symbols for a slot to carry PUCCH
pub const PUCCH_MIN_NOF_SYMBOLS: u8 = 4;

/// Expert scheduler configuration, common to all cells
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerExpertConfig {
    /// Fixed PDSCH MCS
    #[serde(default = "default_dl_mcs")]
    pub dl_mcs: SchMcsIndex,
    /// Fixed PUSCH MCS
    #[serde(default = "default_ul_mcs")]
    pub ul_mcs: SchMcsIndex,
    /// PDCCH aggregation level used for UE DCIs, in CCEs
    #[serde(default = "default_aggregation_level")]
    pub pdcch_aggregation_level: u8,
    /// Number of DMRS symbols per shared channel allocation
    #[serde(default = "default_nof_dmrs_symbols")]
    pub nof_dmrs_symbols: u8,
    /// Maximum PDSCH grants committed per slot and cell
    #[serde(default = "default_max_grants_per_slot")]
    pub max_pdschs_per_slot: usize,
    /// Maximum PUSCH grants committed per slot and cell
    #[serde(default = "default_max_grants_per_slot")]
    pub max_puschs_per_slot: usize,
    /// Maximum UE PDCCHs per slot and direction
    #[serde(default = "default_max_pdcchs_per_slot")]
    pub max_pdcchs_per_slot: usize,
    /// Maximum PUCCH resources per UL slot
    #[serde(default = "default_max_pucchs_per_slot")]
    pub max_pucchs_per_slot: usize,
    /// Maximum HARQ-ACK bits multiplexed in one UCI
    #[serde(default = "default_max_harq_bits_per_uci")]
    pub max_harq_bits_per_uci: u8,
    /// Candidate PDSCH-to-HARQ-ACK delays, tried in order
    #[serde(default = "default_k1_candidates")]
    pub k1_candidates: Vec<u8>,
    /// Maximum number of HARQ retransmissions
    #[serde(default = "default_max_nof_harq_retxs")]
    pub max_nof_harq_retxs: u8,
    /// Slots to wait for HARQ feedback past its expected slot before assuming NACK
    #[serde(default = "default_harq_feedback_timeout")]
    pub harq_feedback_timeout_slots: u32,
    /// UL grant size issued in response to a scheduling request
    #[serde(default = "default_sr_grant_bytes")]
    pub sr_grant_bytes: u32,
    /// Maximum number of UEs
    #[serde(default = "default_max_nof_ues")]
    pub max_nof_ues: usize,
    /// Maximum number of cells
    #[serde(default = "default_max_nof_cells")]
    pub max_nof_cells: usize,
    /// Capacity of the indication queue
    #[serde(default = "default_indication_queue_size")]
    pub indication_queue_size: usize,
    /// Maximum indications processed per slot
    #[serde(default = "default_max_indications_per_slot")]
    pub max_indications_per_slot: usize,
}

fn default_dl_mcs() -> SchMcsIndex {
    SchMcsIndex::new(20)
}

fn default_ul_mcs() -> SchMcsIndex {
    SchMcsIndex::new(16)
}

fn default_aggregation_level() -> u8 {
    4
}

fn default_nof_dmrs_symbols() -> u8 {
    1
}

fn default_max_grants_per_slot() -> usize {
    8
}

fn default_max_pdcchs_per_slot() -> usize {
    8
}

fn default_max_pucchs_per_slot() -> usize {
    16
}

fn default_max_harq_bits_per_uci() -> u8 {
    8
}

fn default_k1_candidates() -> Vec<u8> {
    (4..=12).collect()
}

fn default_max_nof_harq_retxs() -> u8 {
    4
}

fn default_harq_feedback_timeout() -> u32 {
    10
}

fn default_sr_grant_bytes() -> u32 {
    512
}

fn default_max_nof_ues() -> usize {
    64
}

fn default_max_nof_cells() -> usize {
    MAX_NOF_DU_CELLS
}

fn default_indication_queue_size() -> usize {
    4096
}

fn default_max_indications_per_slot() -> usize {
    256
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            dl_mcs: default_dl_mcs(),
            ul_mcs: default_ul_mcs(),
            pdcch_aggregation_level: default_aggregation_level(),
            nof_dmrs_symbols: default_nof_dmrs_symbols(),
            max_pdschs_per_slot: default_max_grants_per_slot(),
            max_puschs_per_slot: default_max_grants_per_slot(),
            max_pdcchs_per_slot: default_max_pdcchs_per_slot(),
            max_pucchs_per_slot: default_max_pucchs_per_slot(),
            max_harq_bits_per_uci: default_max_harq_bits_per_uci(),
            k1_candidates: default_k1_candidates(),
            max_nof_harq_retxs: default_max_nof_harq_retxs(),
            harq_feedback_timeout_slots: default_harq_feedback_timeout(),
            sr_grant_bytes: default_sr_grant_bytes(),
            max_nof_ues: default_max_nof_ues(),
            max_nof_cells: default_max_nof_cells(),
            indication_queue_size: default_indication_queue_size(),
            max_indications_per_slot: default_max_indications_per_slot(),
        }
    }
}

impl SchedulerExpertConfig {
    /// Validate the configuration against the scheduler's fixed capacities
    pub fn validate(&self) -> Result<(), SchedError> {
        if mcs_description_qam64(self.dl_mcs).is_none() || mcs_description_qam64(self.ul_mcs).is_none() {
            return Err(SchedError::InvalidConfiguration(format!(
                "MCS {}/{} reserved for retransmissions",
                self.dl_mcs, self.ul_mcs
            )));
        }
        if ![1, 2, 4, 8, 16].contains(&self.pdcch_aggregation_level) {
            return Err(SchedError::InvalidConfiguration(format!(
                "Invalid aggregation level {}",
                self.pdcch_aggregation_level
            )));
        }
        if self.nof_dmrs_symbols == 0 || self.nof_dmrs_symbols > 4 {
            return Err(SchedError::InvalidConfiguration(format!(
                "Invalid number of DMRS symbols {}",
                self.nof_dmrs_symbols
            )));
        }
        check_capacity("max_pdschs_per_slot", self.max_pdschs_per_slot, MAX_PDSCHS_PER_SLOT)?;
        check_capacity("max_puschs_per_slot", self.max_puschs_per_slot, MAX_PUSCHS_PER_SLOT)?;
        check_capacity(
            "max_pdcchs_per_slot",
            self.max_pdcchs_per_slot,
            MAX_DL_PDCCHS_PER_SLOT.min(MAX_UL_PDCCHS_PER_SLOT),
        )?;
        check_capacity("max_pucchs_per_slot", self.max_pucchs_per_slot, MAX_PUCCHS_PER_SLOT)?;
        check_capacity("max_nof_ues", self.max_nof_ues, MAX_NOF_DU_UES)?;
        check_capacity("max_nof_cells", self.max_nof_cells, MAX_NOF_DU_CELLS)?;
        check_capacity("k1_candidates", self.k1_candidates.len(), MAX_K1_CANDIDATES)?;
        if self.k1_candidates.is_empty() {
            return Err(SchedError::InvalidConfiguration("Empty K1 candidate list".into()));
        }
        if let Some(&k1) = self.k1_candidates.iter().find(|&&k1| k1 as usize > SCHEDULER_MAX_K1) {
            return Err(SchedError::LookaheadExceeded {
                param: "k1",
                value: k1 as u32,
                max: SCHEDULER_MAX_K1 as u32,
            });
        }
        if self.max_harq_bits_per_uci == 0 {
            return Err(SchedError::InvalidConfiguration("UCI must carry at least one HARQ bit".into()));
        }
        if self.indication_queue_size == 0 || self.max_indications_per_slot == 0 {
            return Err(SchedError::InvalidConfiguration("Indication queue must not be empty".into()));
        }
        Ok(())
    }

    /// PDSCH MCS description
    pub fn dl_mcs_description(&self) -> SchMcsDescription {
        // Validated at configuration time.
        mcs_description_qam64(self.dl_mcs).unwrap_or(MCS_FALLBACK)
    }

    /// PUSCH MCS description
    pub fn ul_mcs_description(&self) -> SchMcsDescription {
        mcs_description_qam64(self.ul_mcs).unwrap_or(MCS_FALLBACK)
    }
}

const MCS_FALLBACK: SchMcsDescription = SchMcsDescription {
    modulation: common::ModulationScheme::Qpsk,
    target_code_rate: 120.0,
};

fn check_capacity(param: &str, value: usize, max: usize) -> Result<(), SchedError> {
    if value > max {
        return Err(SchedError::CapacityExceeded(format!(
            "{}={} exceeds the supported maximum {}",
            param, value, max
        )));
    }
    Ok(())
}

/// Cell configuration, provided at cell bring-up
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfiguration {
    /// DU-local cell index
    pub cell_index: DuCellIndex,
    /// Common subcarrier spacing
    pub scs: SubcarrierSpacing,
    /// Channel bandwidth
    pub bandwidth: Bandwidth,
    /// Explicit number of RBs, overriding the bandwidth table
    #[serde(default)]
    pub nof_rbs: Option<u16>,
    /// TDD pattern, absent for FDD
    #[serde(default)]
    pub tdd: Option<TddPattern>,
    /// PDSCH symbols within the slot
    #[serde(default = "default_pdsch_symbols")]
    pub pdsch_symbols: OfdmSymbolRange,
    /// PUSCH symbols within the slot
    #[serde(default = "default_pusch_symbols")]
    pub pusch_symbols: OfdmSymbolRange,
    /// CORESET configuration index, TS 38.213 Table 13-1
    #[serde(default = "default_coreset_index")]
    pub coreset_index: u8,
    /// PDCCH to PDSCH delay
    #[serde(default)]
    pub k0: u8,
    /// Candidate PDCCH to PUSCH delays, tried in order
    #[serde(default = "default_k2_candidates")]
    pub k2_candidates: Vec<u8>,
    /// RBs reserved for PUCCH at each edge of the UL band
    #[serde(default = "default_pucch_guard_rbs")]
    pub pucch_guard_rbs: u16,
    /// RAN slices of the cell
    #[serde(default = "default_slices")]
    pub slices: Vec<RanSliceConfig>,
}

fn default_pdsch_symbols() -> OfdmSymbolRange {
    OfdmSymbolRange::new(2, NOF_OFDM_SYMBOLS_PER_SLOT)
}

fn default_pusch_symbols() -> OfdmSymbolRange {
    OfdmSymbolRange::full_slot()
}

fn default_coreset_index() -> u8 {
    8
}

fn default_k2_candidates() -> Vec<u8> {
    vec![4]
}

fn default_pucch_guard_rbs() -> u16 {
    2
}

fn default_slices() -> Vec<RanSliceConfig> {
    vec![RanSliceConfig::new(RanSliceId::new(0))]
}

impl CellConfiguration {
    /// Create an FDD cell configuration with default scheduling parameters
    pub fn new(cell_index: DuCellIndex, scs: SubcarrierSpacing, bandwidth: Bandwidth) -> Self {
        Self {
            cell_index,
            scs,
            bandwidth,
            nof_rbs: None,
            tdd: None,
            pdsch_symbols: default_pdsch_symbols(),
            pusch_symbols: default_pusch_symbols(),
            coreset_index: default_coreset_index(),
            k0: 0,
            k2_candidates: default_k2_candidates(),
            pucch_guard_rbs: default_pucch_guard_rbs(),
            slices: default_slices(),
        }
    }

    /// Use the given TDD pattern
    pub fn with_tdd(mut self, tdd: TddPattern) -> Self {
        self.tdd = Some(tdd);
        self
    }

    /// Number of RBs of the cell bandwidth part
    pub fn nof_rbs(&self) -> Result<u16, SchedError> {
        match self.nof_rbs {
            Some(nof_rbs) => Ok(nof_rbs),
            None => self.bandwidth.nof_rbs(self.scs).ok_or_else(|| {
                SchedError::InvalidConfiguration(format!(
                    "Invalid bandwidth {:?} and SCS {:?} combination",
                    self.bandwidth, self.scs
                ))
            }),
        }
    }

    /// Validate the cell configuration and derive its scheduling parameters
    pub fn validate(&self, expert_cfg: &SchedulerExpertConfig) -> Result<CellParams, SchedError> {
        let nof_rbs = self.nof_rbs()?;
        if nof_rbs == 0 || nof_rbs > MAX_NOF_PRBS {
            return Err(SchedError::InvalidConfiguration(format!("Invalid number of RBs {}", nof_rbs)));
        }
        if self.cell_index.as_usize() >= expert_cfg.max_nof_cells {
            return Err(SchedError::CapacityExceeded(format!(
                "Cell index {} beyond the configured {} cells",
                self.cell_index, expert_cfg.max_nof_cells
            )));
        }
        for symbols in [&self.pdsch_symbols, &self.pusch_symbols] {
            if symbols.is_empty() || symbols.stop > NOF_OFDM_SYMBOLS_PER_SLOT {
                return Err(SchedError::InvalidConfiguration(format!("Invalid symbol range {}", symbols)));
            }
            if symbols.length() <= expert_cfg.nof_dmrs_symbols {
                return Err(SchedError::InvalidConfiguration(format!(
                    "Symbol range {} leaves no room for data",
                    symbols
                )));
            }
        }
        if 2 * self.pucch_guard_rbs >= nof_rbs {
            return Err(SchedError::InvalidConfiguration(format!(
                "PUCCH guard bands of {} RBs leave no PUSCH RBs",
                self.pucch_guard_rbs
            )));
        }
        if self.k0 as usize > SCHEDULER_MAX_K0 {
            return Err(SchedError::LookaheadExceeded {
                param: "k0",
                value: self.k0 as u32,
                max: SCHEDULER_MAX_K0 as u32,
            });
        }
        let max_k1 = expert_cfg.k1_candidates.iter().copied().max().unwrap_or(0);
        if self.k0 as usize + max_k1 as usize >= RING_ALLOCATOR_SIZE {
            return Err(SchedError::LookaheadExceeded {
                param: "k0+k1",
                value: self.k0 as u32 + max_k1 as u32,
                max: RING_ALLOCATOR_SIZE as u32 - 1,
            });
        }
        if self.k2_candidates.is_empty() || self.k2_candidates.len() > MAX_K2_CANDIDATES {
            return Err(SchedError::InvalidConfiguration(format!(
                "Expected between 1 and {} K2 candidates, got {}",
                MAX_K2_CANDIDATES,
                self.k2_candidates.len()
            )));
        }
        if let Some(&k2) = self.k2_candidates.iter().find(|&&k2| k2 as usize > SCHEDULER_MAX_K2) {
            return Err(SchedError::LookaheadExceeded {
                param: "k2",
                value: k2 as u32,
                max: SCHEDULER_MAX_K2 as u32,
            });
        }
        if let Some(tdd) = &self.tdd {
            tdd.validate(self.scs)?;
        }
        let coreset = crate::pdcch::CoresetConfig::from_index(self.coreset_index)?;
        if coreset.num_rbs > nof_rbs as u32 {
            return Err(SchedError::InvalidConfiguration(format!(
                "CORESET of {} RBs does not fit in {} RBs",
                coreset.num_rbs, nof_rbs
            )));
        }
        if coreset.num_symbols > self.pdsch_symbols.start as u32 {
            return Err(SchedError::InvalidConfiguration(format!(
                "CORESET of {} symbols overlaps PDSCH symbols {}",
                coreset.num_symbols, self.pdsch_symbols
            )));
        }
        if self.slices.is_empty() {
            return Err(SchedError::InvalidConfiguration("Cell without RAN slices".into()));
        }

        Ok(CellParams {
            cell_index: self.cell_index,
            scs: self.scs,
            nof_rbs,
            tdd: self.tdd,
            pdsch_symbols: self.pdsch_symbols,
            pusch_symbols: self.pusch_symbols,
            k0: self.k0,
            pucch_guard_rbs: self.pucch_guard_rbs,
            coreset_nof_symbols: coreset.num_symbols as u8,
            nof_dmrs_symbols: expert_cfg.nof_dmrs_symbols,
        })
    }
}

/// Validated, copyable scheduling parameters of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParams {
    pub cell_index: DuCellIndex,
    pub scs: SubcarrierSpacing,
    pub nof_rbs: u16,
    pub tdd: Option<TddPattern>,
    pub pdsch_symbols: OfdmSymbolRange,
    pub pusch_symbols: OfdmSymbolRange,
    pub k0: u8,
    pub pucch_guard_rbs: u16,
    pub coreset_nof_symbols: u8,
    pub nof_dmrs_symbols: u8,
}

impl CellParams {
    /// DL symbols available in a slot, starting at symbol 0
    pub fn dl_symbols(&self, slot: SlotPoint) -> OfdmSymbolRange {
        let n = self.tdd.map_or(NOF_OFDM_SYMBOLS_PER_SLOT, |tdd| tdd.nof_dl_symbols(slot));
        OfdmSymbolRange::new(0, n)
    }

    /// UL symbols available in a slot, ending at the last symbol
    pub fn ul_symbols(&self, slot: SlotPoint) -> OfdmSymbolRange {
        let n = self.tdd.map_or(NOF_OFDM_SYMBOLS_PER_SLOT, |tdd| tdd.nof_ul_symbols(slot));
        OfdmSymbolRange::new(NOF_OFDM_SYMBOLS_PER_SLOT - n, NOF_OFDM_SYMBOLS_PER_SLOT)
    }

    pub fn is_dl_enabled(&self, slot: SlotPoint) -> bool {
        !self.dl_symbols(slot).is_empty()
    }

    pub fn is_ul_enabled(&self, slot: SlotPoint) -> bool {
        !self.ul_symbols(slot).is_empty()
    }

    pub fn is_fully_dl_enabled(&self, slot: SlotPoint) -> bool {
        self.dl_symbols(slot).length() == NOF_OFDM_SYMBOLS_PER_SLOT
    }

    pub fn is_fully_ul_enabled(&self, slot: SlotPoint) -> bool {
        self.ul_symbols(slot).length() == NOF_OFDM_SYMBOLS_PER_SLOT
    }

    /// Check whether the PDCCH CORESET fits in the DL symbols of a slot
    pub fn has_pdcch_room(&self, slot: SlotPoint) -> bool {
        self.dl_symbols(slot).length() >= self.coreset_nof_symbols
    }

    /// Check whether the given symbols can carry PDSCH in a slot
    pub fn has_pdsch_room(&self, slot: SlotPoint, symbols: &OfdmSymbolRange) -> bool {
        self.dl_symbols(slot).contains(symbols)
    }

    /// Check whether the given symbols can carry PUSCH in a slot
    pub fn has_pusch_room(&self, slot: SlotPoint, symbols: &OfdmSymbolRange) -> bool {
        self.ul_symbols(slot).contains(symbols)
    }

    /// Check whether a slot can carry PUCCH
    pub fn has_pucch_room(&self, slot: SlotPoint) -> bool {
        self.ul_symbols(slot).length() >= PUCCH_MIN_NOF_SYMBOLS
    }
}
