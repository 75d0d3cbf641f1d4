//! Test doubles and a bench wiring one cell around the UE grid allocator

use super::grant::{GrantKind, UePdschGrant, UePuschGrant};
use super::ue_cell_grid_allocator::{SharedUeRepository, UeCellGridAllocator};
use crate::cell::CellResourceAllocator;
use crate::config::{CellConfiguration, CellParams, SchedulerExpertConfig};
use crate::pdcch::{CoresetConfig, DciRequest, PdcchResourceAllocator, PdcchResourceAllocatorImpl};
use crate::uci::{UciAllocator, UciAllocatorImpl, UciKind};
use crate::ue::{HarqConfig, Ue, UeRepository};
use common::{
    Bandwidth, DuCellIndex, DuUeIndex, LcgId, LinkDirection, Lcid, RanSliceId, Rnti, SlotPoint,
    SubcarrierSpacing,
};
use std::cell::RefCell;
use std::rc::Rc;

/// PDCCH allocator counting the calls it receives
pub struct CountingPdcch {
    pub inner: PdcchResourceAllocatorImpl,
    pub nof_reserve_calls: usize,
}

impl PdcchResourceAllocator for CountingPdcch {
    fn try_reserve(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dci: &DciRequest) -> bool {
        self.nof_reserve_calls += 1;
        self.inner.try_reserve(cell_index, pdcch_slot, dci)
    }

    fn cancel_last(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint) {
        self.inner.cancel_last(cell_index, pdcch_slot)
    }

    fn is_exhausted(&self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dir: LinkDirection) -> bool {
        self.inner.is_exhausted(cell_index, pdcch_slot, dir)
    }
}

/// UCI allocator counting the calls it receives
pub struct CountingUci {
    pub inner: UciAllocatorImpl,
    pub nof_reserve_calls: usize,
}

impl UciAllocator for CountingUci {
    fn try_reserve(&mut self, cell_index: DuCellIndex, uci_slot: SlotPoint, ue_index: DuUeIndex, rnti: Rnti, kind: UciKind) -> bool {
        self.nof_reserve_calls += 1;
        self.inner.try_reserve(cell_index, uci_slot, ue_index, rnti, kind)
    }

    fn cancel_last(&mut self, cell_index: DuCellIndex, uci_slot: SlotPoint) {
        self.inner.cancel_last(cell_index, uci_slot)
    }
}

pub fn fdd_cell() -> CellConfiguration {
    CellConfiguration::new(DuCellIndex::new(0), SubcarrierSpacing::Scs30, Bandwidth::Bw20)
}

/// One cell with counting collaborators
pub struct GridTestBench {
    pub expert: SchedulerExpertConfig,
    pub params: CellParams,
    pub ues: SharedUeRepository,
    pub grid: Rc<RefCell<CellResourceAllocator>>,
    pub pdcch: Rc<RefCell<CountingPdcch>>,
    pub uci: Rc<RefCell<CountingUci>>,
    pub alloc: UeCellGridAllocator,
    pub slot: SlotPoint,
}

impl GridTestBench {
    pub fn new(expert: SchedulerExpertConfig, cell_cfg: CellConfiguration) -> Self {
        let params = cell_cfg.validate(&expert).unwrap();
        Self::with_params(expert, params, &cell_cfg)
    }

    pub fn with_params(expert: SchedulerExpertConfig, params: CellParams, cell_cfg: &CellConfiguration) -> Self {
        let coreset = CoresetConfig::from_index(cell_cfg.coreset_index).unwrap();
        let ues = Rc::new(RefCell::new(UeRepository::new(expert.max_nof_ues)));
        let grid = Rc::new(RefCell::new(CellResourceAllocator::new(params)));
        let pdcch = Rc::new(RefCell::new(CountingPdcch {
            inner: PdcchResourceAllocatorImpl::new(params, coreset, &expert),
            nof_reserve_calls: 0,
        }));
        let uci = Rc::new(RefCell::new(CountingUci {
            inner: UciAllocatorImpl::new(params, &expert),
            nof_reserve_calls: 0,
        }));
        let mut alloc = UeCellGridAllocator::new(&expert, ues.clone());
        alloc.add_cell(params.cell_index, pdcch.clone(), uci.clone(), grid.clone());

        let mut bench = Self {
            expert,
            params,
            ues,
            grid,
            pdcch,
            uci,
            alloc,
            slot: SlotPoint::new(params.scs, 0, 0),
        };
        bench.slot_indication(bench.slot);
        bench
    }

    pub fn slot_indication(&mut self, slot: SlotPoint) {
        self.slot = slot;
        self.grid.borrow_mut().slot_indication(slot);
        self.pdcch.borrow_mut().inner.slot_indication(slot);
        self.uci.borrow_mut().inner.slot_indication(slot);
        self.ues.borrow_mut().slot_indication(slot);
        self.alloc.slot_indication(slot);
    }

    pub fn next_slot(&mut self) {
        let next = self.slot + 1;
        self.slot_indication(next);
    }

    pub fn add_ue(&self, idx: u16) -> DuUeIndex {
        let ue_index = DuUeIndex::new(idx);
        let ue = Ue::new(
            ue_index,
            Rnti::new(0x4601 + idx),
            self.params.cell_index,
            RanSliceId::new(0),
            self.slot,
            HarqConfig::from(&self.expert),
        );
        self.ues.borrow_mut().add_ue(ue).unwrap();
        ue_index
    }

    pub fn set_dl_bytes(&self, ue_index: DuUeIndex, bytes: u32) {
        let mut ues = self.ues.borrow_mut();
        ues.get_mut(ue_index).unwrap().handle_dl_buffer_state(Lcid::new(4), bytes);
    }

    pub fn set_ul_bytes(&self, ue_index: DuUeIndex, bytes: u32) {
        let mut ues = self.ues.borrow_mut();
        ues.get_mut(ue_index).unwrap().handle_bsr(LcgId::new(0), bytes);
    }

    pub fn dl_grant(&self, ue_index: DuUeIndex, nof_bytes: u32) -> UePdschGrant {
        UePdschGrant {
            ue_index,
            cell_index: self.params.cell_index,
            kind: GrantKind::NewTx { nof_bytes },
            max_nof_rbs: self.params.nof_rbs as u32,
            symbols: None,
        }
    }

    pub fn ul_grant(&self, ue_index: DuUeIndex, nof_bytes: u32, k2: u8) -> UePuschGrant {
        UePuschGrant {
            ue_index,
            cell_index: self.params.cell_index,
            kind: GrantKind::NewTx { nof_bytes },
            max_nof_rbs: self.params.nof_rbs as u32,
            k2,
            symbols: None,
        }
    }

    /// (PDCCH, UCI, grid) reservation calls so far
    pub fn nof_reserve_calls(&self) -> (usize, usize, u64) {
        (
            self.pdcch.borrow().nof_reserve_calls,
            self.uci.borrow().nof_reserve_calls,
            self.grid.borrow().nof_reserve_calls(),
        )
    }
}
