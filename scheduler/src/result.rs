//! Scheduling Results
//! 
//! Per-slot output of the scheduler, handed to the PHY adaptation layer.

use crate::{
    MAX_DL_PDCCHS_PER_SLOT, MAX_PDSCHS_PER_SLOT, MAX_PUCCHS_PER_SLOT, MAX_PUSCHS_PER_SLOT,
    MAX_UL_PDCCHS_PER_SLOT,
};
use common::{
    DuCellIndex, DuUeIndex, HarqId, LinkDirection, OfdmSymbolRange, RanSliceId, RbInterval, Rnti,
    SchMcsIndex, SlotPoint, UciContent,
};
use heapless::Vec;

/// UE DCI placed in the CORESET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdcchInfo {
    pub rnti: Rnti,
    pub ue_index: DuUeIndex,
    pub direction: LinkDirection,
    /// First CCE of the candidate
    pub cce_index: u8,
    pub aggregation_level: u8,
}

/// PDSCH grant of one UE
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DlGrantInfo {
    pub ue_index: DuUeIndex,
    pub rnti: Rnti,
    pub slice_id: RanSliceId,
    pub harq_id: HarqId,
    pub pdsch_slot: SlotPoint,
    /// Slot carrying the HARQ-ACK of this transmission
    pub uci_slot: SlotPoint,
    pub rbs: RbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: SchMcsIndex,
    pub tbs_bytes: u32,
    /// Zero for a new transmission
    pub nof_retxs: u8,
}

/// PUSCH grant of one UE
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UlGrantInfo {
    pub ue_index: DuUeIndex,
    pub rnti: Rnti,
    pub slice_id: RanSliceId,
    pub harq_id: HarqId,
    pub pusch_slot: SlotPoint,
    pub rbs: RbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: SchMcsIndex,
    pub tbs_bytes: u32,
    pub nof_retxs: u8,
    /// HARQ-ACK bits multiplexed on this PUSCH, as a bitmap of DL HARQ ids
    pub uci_harq_ids: u16,
}

/// PUCCH transmission of one UE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PucchInfo {
    pub ue_index: DuUeIndex,
    pub rnti: Rnti,
    pub content: UciContent,
    /// DL HARQ processes acknowledged in this PUCCH, as a bitmap
    pub harq_ids: u16,
}

impl PucchInfo {
    /// HARQ processes reported in this PUCCH
    pub fn harq_id_iter(&self) -> impl Iterator<Item = HarqId> + '_ {
        (0..16u8)
            .filter(move |id| self.harq_ids & (1 << id) != 0)
            .map(HarqId::new)
    }

    pub fn nof_harq_bits(&self) -> u32 {
        self.harq_ids.count_ones()
    }
}

/// Scheduling decision of one cell for one slot
#[derive(Debug, Clone, Default)]
pub struct SchedResult {
    pub slot: Option<SlotPoint>,
    pub cell_index: Option<DuCellIndex>,
    pub dl_pdcchs: Vec<PdcchInfo, MAX_DL_PDCCHS_PER_SLOT>,
    pub ul_pdcchs: Vec<PdcchInfo, MAX_UL_PDCCHS_PER_SLOT>,
    pub dl_grants: Vec<DlGrantInfo, MAX_PDSCHS_PER_SLOT>,
    pub ul_grants: Vec<UlGrantInfo, MAX_PUSCHS_PER_SLOT>,
    pub pucchs: Vec<PucchInfo, MAX_PUCCHS_PER_SLOT>,
}

impl SchedResult {
    /// Reset the result for a new slot, keeping its storage
    pub fn reset(&mut self, slot: SlotPoint, cell_index: DuCellIndex) {
        self.slot = Some(slot);
        self.cell_index = Some(cell_index);
        self.dl_pdcchs.clear();
        self.ul_pdcchs.clear();
        self.dl_grants.clear();
        self.ul_grants.clear();
        self.pucchs.clear();
    }

    /// Total number of DL RBs granted in the slot
    pub fn nof_dl_rbs(&self) -> u32 {
        self.dl_grants.iter().map(|g| g.rbs.length() as u32).sum()
    }

    /// Total number of UL RBs granted in the slot
    pub fn nof_ul_rbs(&self) -> u32 {
        self.ul_grants.iter().map(|g| g.rbs.length() as u32).sum()
    }
}
