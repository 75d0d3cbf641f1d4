//! CCE allocation of the UE-dedicated search space

use super::{CoresetConfig, DciRequest, PdcchResourceAllocator};
use crate::cell::SlotRing;
use crate::config::{CellParams, SchedulerExpertConfig};
use crate::result::PdcchInfo;
use crate::{MAX_DL_PDCCHS_PER_SLOT, MAX_UL_PDCCHS_PER_SLOT, PDCCH_RING_SIZE};
use common::{DuCellIndex, LinkDirection, SlotPoint};
use heapless::Vec;
use tracing::trace;

/// PDCCH state of one slot
#[derive(Debug, Clone, Default)]
struct PdcchSlot {
    /// One bit per CCE
    used_cces: u64,
    dl: Vec<PdcchInfo, MAX_DL_PDCCHS_PER_SLOT>,
    ul: Vec<PdcchInfo, MAX_UL_PDCCHS_PER_SLOT>,
    /// Direction of each reservation, in order
    history: Vec<LinkDirection, { MAX_DL_PDCCHS_PER_SLOT + MAX_UL_PDCCHS_PER_SLOT }>,
}

impl PdcchSlot {
    fn clear(&mut self) {
        self.used_cces = 0;
        self.dl.clear();
        self.ul.clear();
        self.history.clear();
    }

    fn list(&self, dir: LinkDirection) -> &[PdcchInfo] {
        match dir {
            LinkDirection::Downlink => &self.dl,
            LinkDirection::Uplink => &self.ul,
        }
    }
}

/// Observable PDCCH state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdcchSlotSnapshot {
    pub used_cces: u64,
    pub nof_dl_pdcchs: usize,
    pub nof_ul_pdcchs: usize,
}

fn cce_mask(start: u32, aggregation_level: u8) -> u64 {
    ((1u64 << aggregation_level) - 1) << start
}

/// PDCCH allocator of one cell
#[derive(Debug, Clone)]
pub struct PdcchResourceAllocatorImpl {
    params: CellParams,
    nof_cces: u32,
    max_pdcchs_per_slot: usize,
    aggregation_level: u8,
    slots: SlotRing<PdcchSlot>,
}

impl PdcchResourceAllocatorImpl {
    pub fn new(params: CellParams, coreset: CoresetConfig, expert_cfg: &SchedulerExpertConfig) -> Self {
        Self {
            params,
            nof_cces: coreset.nof_cces().min(u64::BITS),
            max_pdcchs_per_slot: expert_cfg.max_pdcchs_per_slot,
            aggregation_level: expert_cfg.pdcch_aggregation_level,
            slots: SlotRing::new(PDCCH_RING_SIZE),
        }
    }

    pub fn nof_cces(&self) -> u32 {
        self.nof_cces
    }

    pub fn slot_indication(&mut self, slot: SlotPoint) {
        self.slots.slot_indication(slot, |_, _, entry| entry.clear());
    }

    /// Lowest free CCE position aligned to the aggregation level
    fn find_free_cces(&self, entry: &PdcchSlot, aggregation_level: u8) -> Option<u32> {
        let al = aggregation_level as u32;
        if al == 0 || al > self.nof_cces {
            return None;
        }
        (0..=self.nof_cces - al)
            .step_by(al as usize)
            .find(|&start| entry.used_cces & cce_mask(start, aggregation_level) == 0)
    }

    /// DCIs placed in a slot
    pub fn pdcchs(&self, slot: SlotPoint, dir: LinkDirection) -> &[PdcchInfo] {
        self.slots.get(slot).list(dir)
    }

    pub fn snapshot(&self, slot: SlotPoint) -> PdcchSlotSnapshot {
        let entry = self.slots.get(slot);
        PdcchSlotSnapshot {
            used_cces: entry.used_cces,
            nof_dl_pdcchs: entry.dl.len(),
            nof_ul_pdcchs: entry.ul.len(),
        }
    }
}

impl PdcchResourceAllocator for PdcchResourceAllocatorImpl {
    fn try_reserve(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dci: &DciRequest) -> bool {
        debug_assert_eq!(cell_index, self.params.cell_index);
        if !self.params.has_pdcch_room(pdcch_slot) {
            return false;
        }
        let entry = self.slots.get(pdcch_slot);
        if entry.list(dci.direction).len() >= self.max_pdcchs_per_slot {
            return false;
        }
        let Some(cce_index) = self.find_free_cces(entry, dci.aggregation_level) else {
            return false;
        };

        let info = PdcchInfo {
            rnti: dci.rnti,
            ue_index: dci.ue_index,
            direction: dci.direction,
            cce_index: cce_index as u8,
            aggregation_level: dci.aggregation_level,
        };
        let entry = self.slots.get_mut(pdcch_slot);
        let pushed = match dci.direction {
            LinkDirection::Downlink => entry.dl.push(info).is_ok(),
            LinkDirection::Uplink => entry.ul.push(info).is_ok(),
        };
        if !pushed || entry.history.push(dci.direction).is_err() {
            return false;
        }
        entry.used_cces |= cce_mask(cce_index, dci.aggregation_level);
        trace!(
            "{} PDCCH for rnti={} at slot {}: CCEs [{}, {})",
            dci.direction,
            dci.rnti,
            pdcch_slot,
            cce_index,
            cce_index + dci.aggregation_level as u32
        );
        true
    }

    fn cancel_last(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint) {
        debug_assert_eq!(cell_index, self.params.cell_index);
        let entry = self.slots.get_mut(pdcch_slot);
        let Some(dir) = entry.history.pop() else {
            return;
        };
        let last = match dir {
            LinkDirection::Downlink => entry.dl.pop(),
            LinkDirection::Uplink => entry.ul.pop(),
        };
        if let Some(info) = last {
            entry.used_cces &= !cce_mask(info.cce_index as u32, info.aggregation_level);
        }
    }

    fn is_exhausted(&self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dir: LinkDirection) -> bool {
        debug_assert_eq!(cell_index, self.params.cell_index);
        if !self.params.has_pdcch_room(pdcch_slot) {
            return true;
        }
        let entry = self.slots.get(pdcch_slot);
        entry.list(dir).len() >= self.max_pdcchs_per_slot
            || self.find_free_cces(entry, self.aggregation_level).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TddPattern;
    use crate::config::CellConfiguration;
    use common::{Bandwidth, DuUeIndex, Rnti, SubcarrierSpacing};

    fn setup() -> (PdcchResourceAllocatorImpl, SlotPoint) {
        let expert = SchedulerExpertConfig::default();
        let cell_cfg = CellConfiguration::new(DuCellIndex::new(0), SubcarrierSpacing::Scs30, Bandwidth::Bw20)
            .with_tdd(TddPattern::new(10, 6, 4, 3, 4));
        let params = cell_cfg.validate(&expert).unwrap();
        let coreset = CoresetConfig::from_index(cell_cfg.coreset_index).unwrap();
        let mut pdcch = PdcchResourceAllocatorImpl::new(params, coreset, &expert);
        let slot = SlotPoint::new(SubcarrierSpacing::Scs30, 0, 0);
        pdcch.slot_indication(slot);
        (pdcch, slot)
    }

    fn dci(ue: u16, dir: LinkDirection) -> DciRequest {
        DciRequest {
            rnti: Rnti::new(0x4601 + ue),
            ue_index: DuUeIndex::new(ue),
            direction: dir,
            aggregation_level: 4,
        }
    }

    #[test]
    fn test_cces_are_exhausted() {
        let (mut pdcch, slot) = setup();
        let cell = DuCellIndex::new(0);
        assert_eq!(pdcch.nof_cces(), 16);

        for ue in 0..4 {
            assert!(!pdcch.is_exhausted(cell, slot, LinkDirection::Downlink));
            assert!(pdcch.try_reserve(cell, slot, &dci(ue, LinkDirection::Downlink)));
        }
        assert!(!pdcch.try_reserve(cell, slot, &dci(4, LinkDirection::Uplink)));
        assert!(pdcch.is_exhausted(cell, slot, LinkDirection::Downlink));
        assert!(pdcch.is_exhausted(cell, slot, LinkDirection::Uplink));

        let cces: std::vec::Vec<u8> = pdcch
            .pdcchs(slot, LinkDirection::Downlink)
            .iter()
            .map(|p| p.cce_index)
            .collect();
        assert_eq!(cces, vec![0, 4, 8, 12]);
    }

    #[test]
    fn test_cancel_last_restores_state() {
        let (mut pdcch, slot) = setup();
        let cell = DuCellIndex::new(0);
        assert!(pdcch.try_reserve(cell, slot, &dci(0, LinkDirection::Downlink)));
        let before = pdcch.snapshot(slot);

        assert!(pdcch.try_reserve(cell, slot, &dci(1, LinkDirection::Uplink)));
        assert_ne!(pdcch.snapshot(slot), before);
        pdcch.cancel_last(cell, slot);
        assert_eq!(pdcch.snapshot(slot), before);
        assert!(pdcch.pdcchs(slot, LinkDirection::Uplink).is_empty());
    }

    #[test]
    fn test_no_pdcch_in_ul_slots() {
        let (mut pdcch, slot) = setup();
        let cell = DuCellIndex::new(0);
        let dl_slot = slot + 2;
        pdcch.slot_indication(dl_slot);
        assert!(pdcch.try_reserve(cell, dl_slot, &dci(0, LinkDirection::Downlink)));

        let ul_slot = SlotPoint::new(SubcarrierSpacing::Scs30, 0, 7);
        pdcch.slot_indication(ul_slot);
        assert!(pdcch.is_exhausted(cell, ul_slot, LinkDirection::Downlink));
        assert!(!pdcch.try_reserve(cell, ul_slot, &dci(0, LinkDirection::Downlink)));
    }
}
