//! Slice Scheduler
//! 
//! Orders the RAN slices of a cell by priority and hands out one candidate
//! per slice and slot, with an RB budget bounded by the slice quota.

use super::{DlRanSliceCandidate, UlRanSliceCandidate};
use crate::SchedError;
use common::{RanSliceId, SNssai, SlotPoint, MAX_NOF_RAN_SLICES};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// RAN slice configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RanSliceConfig {
    pub id: RanSliceId,
    /// S-NSSAI served by the slice
    #[serde(default)]
    pub s_nssai: Option<SNssai>,
    /// Maximum RBs per slot
    #[serde(default = "default_max_rbs")]
    pub max_rbs: u16,
    /// Higher is scheduled first
    #[serde(default)]
    pub priority: u8,
}

fn default_max_rbs() -> u16 {
    u16::MAX
}

impl RanSliceConfig {
    /// Slice without RB quota
    pub fn new(id: RanSliceId) -> Self {
        Self {
            id,
            s_nssai: None,
            max_rbs: default_max_rbs(),
            priority: 0,
        }
    }
}

/// Priority-ordered slices of one cell
#[derive(Debug, Clone)]
pub struct SliceScheduler {
    slices: heapless::Vec<RanSliceConfig, MAX_NOF_RAN_SLICES>,
    nof_rbs: u16,
}

impl SliceScheduler {
    pub fn new(slices: &[RanSliceConfig], nof_rbs: u16) -> Result<Self, SchedError> {
        let mut sorted: heapless::Vec<RanSliceConfig, MAX_NOF_RAN_SLICES> = heapless::Vec::new();
        for cfg in slices {
            if sorted.iter().any(|s| s.id == cfg.id) {
                return Err(SchedError::InvalidConfiguration(format!("Duplicate RAN slice {}", cfg.id)));
            }
            sorted.push(cfg.clone()).map_err(|_| {
                SchedError::CapacityExceeded(format!("More than {} RAN slices", MAX_NOF_RAN_SLICES))
            })?;
        }
        sorted.sort_unstable_by(|a, b| b.priority.cmp(&a.priority).then(a.id.value().cmp(&b.id.value())));
        debug!("RAN slices by priority: {:?}", sorted.iter().map(|s| s.id).collect::<Vec<_>>());
        Ok(Self { slices: sorted, nof_rbs })
    }

    pub fn nof_slices(&self) -> usize {
        self.slices.len()
    }

    /// Slice identifiers in scheduling order
    pub fn slice_ids(&self) -> impl Iterator<Item = RanSliceId> + '_ {
        self.slices.iter().map(|s| s.id)
    }

    pub fn slice_config(&self, id: RanSliceId) -> Result<&RanSliceConfig, SchedError> {
        self.slices.iter().find(|s| s.id == id).ok_or(SchedError::UnknownSlice(id))
    }

    fn rb_budget(&self, pos: usize) -> u32 {
        self.slices[pos].max_rbs.min(self.nof_rbs) as u32
    }

    /// DL candidate of the `pos`-th slice in scheduling order
    pub fn dl_candidate(&self, pos: usize, slot: SlotPoint) -> DlRanSliceCandidate {
        DlRanSliceCandidate::new(self.slices[pos].id, slot, self.rb_budget(pos))
    }

    /// UL candidate of the `pos`-th slice in scheduling order
    pub fn ul_candidate(&self, pos: usize, slot: SlotPoint) -> UlRanSliceCandidate {
        UlRanSliceCandidate::new(self.slices[pos].id, slot, self.rb_budget(pos))
    }
}
