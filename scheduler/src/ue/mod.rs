//! UE Context
//! 
//! Scheduling state of each UE: serving cells with their HARQ entities and
//! the pending DL/UL new-data buffers.

pub mod harq;
pub mod repository;

pub use harq::{HarqEntity, HarqFeedback, HarqOutcome, HarqProcess, HarqState};
pub use repository::UeRepository;

use crate::config::SchedulerExpertConfig;
use crate::{SchedError, MAX_CELLS_PER_UE};
use common::{
    DuCellIndex, DuUeIndex, LcgId, Lcid, RanSliceId, Rnti, SlotPoint, MAX_NOF_LCGS, MAX_NOF_LCIDS,
};

/// HARQ parameters applied to new UE cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqConfig {
    pub max_nof_retxs: u8,
    pub feedback_timeout_slots: u32,
}

impl From<&SchedulerExpertConfig> for HarqConfig {
    fn from(cfg: &SchedulerExpertConfig) -> Self {
        Self {
            max_nof_retxs: cfg.max_nof_harq_retxs,
            feedback_timeout_slots: cfg.harq_feedback_timeout_slots,
        }
    }
}

/// Serving cell of a UE
#[derive(Debug, Clone)]
pub struct UeCell {
    cell_index: DuCellIndex,
    pub harqs: HarqEntity,
}

impl UeCell {
    pub fn cell_index(&self) -> DuCellIndex {
        self.cell_index
    }
}

/// Scheduler UE context
#[derive(Debug, Clone)]
pub struct Ue {
    ue_index: DuUeIndex,
    crnti: Rnti,
    slice_id: RanSliceId,
    /// Serving cells, PCell first
    cells: heapless::Vec<UeCell, MAX_CELLS_PER_UE>,
    /// DL buffer occupancy per logical channel
    dl_pending_bytes: [u32; MAX_NOF_LCIDS],
    /// UL buffer status per logical channel group
    ul_pending_bytes: [u32; MAX_NOF_LCGS],
    sr_pending: bool,
}

impl Ue {
    pub fn new(
        ue_index: DuUeIndex,
        crnti: Rnti,
        pcell_index: DuCellIndex,
        slice_id: RanSliceId,
        slot: SlotPoint,
        harq_cfg: HarqConfig,
    ) -> Self {
        let mut cells = heapless::Vec::new();
        let pcell = UeCell {
            cell_index: pcell_index,
            harqs: HarqEntity::new(crnti, slot, harq_cfg.max_nof_retxs, harq_cfg.feedback_timeout_slots),
        };
        // Capacity is at least one.
        let _ = cells.push(pcell);
        Self {
            ue_index,
            crnti,
            slice_id,
            cells,
            dl_pending_bytes: [0; MAX_NOF_LCIDS],
            ul_pending_bytes: [0; MAX_NOF_LCGS],
            sr_pending: false,
        }
    }

    pub fn ue_index(&self) -> DuUeIndex {
        self.ue_index
    }

    pub fn crnti(&self) -> Rnti {
        self.crnti
    }

    pub fn slice_id(&self) -> RanSliceId {
        self.slice_id
    }

    pub fn pcell_index(&self) -> DuCellIndex {
        self.cells[0].cell_index
    }

    /// Add a secondary serving cell
    pub fn add_cell(&mut self, cell_index: DuCellIndex, slot: SlotPoint, harq_cfg: HarqConfig) -> Result<(), SchedError> {
        if self.find_cell(cell_index).is_some() {
            return Err(SchedError::InvalidState(format!(
                "Cell {} already configured for ue={}",
                cell_index, self.ue_index
            )));
        }
        let cell = UeCell {
            cell_index,
            harqs: HarqEntity::new(self.crnti, slot, harq_cfg.max_nof_retxs, harq_cfg.feedback_timeout_slots),
        };
        self.cells.push(cell).map_err(|_| {
            SchedError::CapacityExceeded(format!("ue={} already has {} cells", self.ue_index, MAX_CELLS_PER_UE))
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = &UeCell> {
        self.cells.iter()
    }

    pub fn find_cell(&self, cell_index: DuCellIndex) -> Option<&UeCell> {
        self.cells.iter().find(|c| c.cell_index == cell_index)
    }

    pub fn find_cell_mut(&mut self, cell_index: DuCellIndex) -> Option<&mut UeCell> {
        self.cells.iter_mut().find(|c| c.cell_index == cell_index)
    }

    /// Advance HARQ timers of all serving cells
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        for cell in self.cells.iter_mut() {
            cell.harqs.slot_indication(slot);
        }
    }

    /// Update the DL buffer occupancy of a logical channel
    pub fn handle_dl_buffer_state(&mut self, lcid: Lcid, bs: u32) {
        self.dl_pending_bytes[lcid.as_usize()] = bs;
    }

    /// Update the UL buffer status of a logical channel group
    pub fn handle_bsr(&mut self, lcg_id: LcgId, nof_bytes: u32) {
        self.ul_pending_bytes[lcg_id.as_usize()] = nof_bytes;
    }

    pub fn handle_sr(&mut self) {
        self.sr_pending = true;
    }

    pub fn sr_pending(&self) -> bool {
        self.sr_pending
    }

    /// DL bytes waiting for a new transmission
    pub fn pending_dl_newtx_bytes(&self) -> u32 {
        self.dl_pending_bytes.iter().fold(0u32, |acc, &b| acc.saturating_add(b))
    }

    /// UL bytes reported by the UE and not yet granted
    pub fn pending_ul_newtx_bytes(&self) -> u32 {
        self.ul_pending_bytes.iter().fold(0u32, |acc, &b| acc.saturating_add(b))
    }

    /// Account for `nof_bytes` of DL data scheduled, in logical channel order
    pub fn drain_dl_bytes(&mut self, nof_bytes: u32) {
        drain(&mut self.dl_pending_bytes, nof_bytes);
    }

    /// Account for `nof_bytes` of UL data granted. Any grant serves a
    /// pending SR.
    pub fn drain_ul_bytes(&mut self, nof_bytes: u32) {
        self.sr_pending = false;
        drain(&mut self.ul_pending_bytes, nof_bytes);
    }
}

fn drain(buffers: &mut [u32], mut nof_bytes: u32) {
    for bs in buffers.iter_mut() {
        if nof_bytes == 0 {
            break;
        }
        let consumed = (*bs).min(nof_bytes);
        *bs -= consumed;
        nof_bytes -= consumed;
    }
}
