//! UE Cell Grid Allocator
//! 
//! Places one UE PDSCH or PUSCH grant per call, atomically across the PDCCH
//! allocator, the UCI allocator and the cell resource grid. Slots found
//! without room are remembered until they pass, so that later requests for
//! them are refused without touching the collaborators again.

use super::grant::{AllocResult, AllocStatus, GrantKind, UePdschGrant, UePuschGrant};
use crate::cell::CellResourceAllocator;
use crate::config::{CellParams, SchedulerExpertConfig};
use crate::pdcch::{DciRequest, PdcchResourceAllocator};
use crate::result::{DlGrantInfo, UlGrantInfo};
use crate::uci::{UciAllocator, UciKind};
use crate::ue::UeRepository;
use crate::{SCHEDULER_MAX_K0, SCHEDULER_MAX_K2};
use common::mcs::{nof_prbs_for_bytes, nof_re_per_prb, tbs_bytes};
use common::{
    DuCellIndex, LinkDirection, RanSliceId, SchMcsDescription, SlotPoint, MAX_NOF_DU_CELLS,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, trace};

pub type SharedPdcchAllocator = Rc<RefCell<dyn PdcchResourceAllocator>>;
pub type SharedUciAllocator = Rc<RefCell<dyn UciAllocator>>;
pub type SharedResourceGrid = Rc<RefCell<CellResourceAllocator>>;
pub type SharedUeRepository = Rc<RefCell<UeRepository>>;

/// A PDSCH slot is reachable from at most `SCHEDULER_MAX_K0 + 1` PDCCH slots
/// that are not yet in the past.
const NO_PDSCH_SPACE_CACHE_SIZE: usize = SCHEDULER_MAX_K0 + 1;
const NO_PUSCH_SPACE_CACHE_SIZE: usize = SCHEDULER_MAX_K2 + 1;

type NoSpaceCache<const N: usize> = heapless::Vec<(SlotPoint, AllocStatus), N>;

fn find_cached<const N: usize>(cache: &NoSpaceCache<N>, slot: SlotPoint) -> Option<AllocStatus> {
    cache.iter().find(|(s, _)| *s == slot).map(|&(_, status)| status)
}

fn mark_no_space<const N: usize>(cache: &mut NoSpaceCache<N>, slot: SlotPoint, status: AllocStatus, dir: LinkDirection) {
    if find_cached(cache, slot).is_some() {
        return;
    }
    trace!("{} slot {} marked as {}", dir, slot, status);
    if cache.push((slot, status)).is_err() {
        panic!("{} no-space cache overflow at slot {}: capacity {}", dir, slot, N);
    }
}

/// Per-cell collaborators and bookkeeping
struct CellEntry {
    params: CellParams,
    pdcch: SharedPdcchAllocator,
    uci: SharedUciAllocator,
    grid: SharedResourceGrid,
    no_pdsch_space: NoSpaceCache<NO_PDSCH_SPACE_CACHE_SIZE>,
    no_pusch_space: NoSpaceCache<NO_PUSCH_SPACE_CACHE_SIZE>,
    /// PDCCH slot in which no further UL DCI fits
    ul_pdcch_exhausted: Option<SlotPoint>,
    /// Grants committed in the current PDCCH slot
    dl_attempts_count: usize,
    ul_attempts_count: usize,
}

fn cell_entry_mut(cells: &mut [Option<CellEntry>], cell_index: DuCellIndex) -> &mut CellEntry {
    match cells.get_mut(cell_index.as_usize()).and_then(Option::as_mut) {
        Some(cell) => cell,
        None => panic!("Cell {} is not registered in the UE grid allocator", cell_index),
    }
}

/// UE grant allocator of all cells
pub struct UeCellGridAllocator {
    expert_cfg: SchedulerExpertConfig,
    dl_mcs: SchMcsDescription,
    ul_mcs: SchMcsDescription,
    ues: SharedUeRepository,
    cells: [Option<CellEntry>; MAX_NOF_DU_CELLS],
    last_slot: Option<SlotPoint>,
}

impl UeCellGridAllocator {
    pub fn new(expert_cfg: &SchedulerExpertConfig, ues: SharedUeRepository) -> Self {
        Self {
            dl_mcs: expert_cfg.dl_mcs_description(),
            ul_mcs: expert_cfg.ul_mcs_description(),
            expert_cfg: expert_cfg.clone(),
            ues,
            cells: std::array::from_fn(|_| None),
            last_slot: None,
        }
    }

    /// Register the collaborators of a cell
    pub fn add_cell(
        &mut self,
        cell_index: DuCellIndex,
        pdcch: SharedPdcchAllocator,
        uci: SharedUciAllocator,
        grid: SharedResourceGrid,
    ) {
        assert!(
            cell_index.as_usize() < self.expert_cfg.max_nof_cells,
            "Cell index {} exceeds the maximum of {} cells",
            cell_index,
            self.expert_cfg.max_nof_cells
        );
        assert!(!self.has_cell(cell_index), "Cell {} already registered", cell_index);
        let params = *grid.borrow().params();
        assert_eq!(params.cell_index, cell_index, "Resource grid belongs to cell {}", params.cell_index);
        assert!(
            params.k0 as usize <= SCHEDULER_MAX_K0,
            "k0={} exceeds the scheduler lookahead {}",
            params.k0,
            SCHEDULER_MAX_K0
        );

        self.cells[cell_index.as_usize()] = Some(CellEntry {
            params,
            pdcch,
            uci,
            grid,
            no_pdsch_space: heapless::Vec::new(),
            no_pusch_space: heapless::Vec::new(),
            ul_pdcch_exhausted: None,
            dl_attempts_count: 0,
            ul_attempts_count: 0,
        });
        info!("Cell {} added to the UE grid allocator", cell_index);
    }

    pub fn has_cell(&self, cell_index: DuCellIndex) -> bool {
        self.cells
            .get(cell_index.as_usize())
            .is_some_and(|c| c.is_some())
    }

    /// Current PDCCH slot
    pub fn slot(&self) -> Option<SlotPoint> {
        self.last_slot
    }

    /// Start a new PDCCH slot. Slots must strictly increase.
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        if let Some(last) = self.last_slot {
            assert!(slot > last, "Slot indication {} does not follow {}", slot, last);
        }
        self.last_slot = Some(slot);

        for cell in self.cells.iter_mut().flatten() {
            cell.no_pdsch_space.retain(|(s, _)| *s >= slot);
            cell.no_pusch_space.retain(|(s, _)| *s >= slot);
            cell.ul_pdcch_exhausted = None;
            cell.dl_attempts_count = 0;
            cell.ul_attempts_count = 0;
        }
    }

    /// Allocate a PDSCH grant in the slot `k0` after the current one
    pub fn allocate_dl_grant(&mut self, grant: &UePdschGrant, slice_id: RanSliceId) -> AllocResult {
        let Some(pdcch_slot) = self.last_slot else {
            panic!("PDSCH allocation before the first slot indication");
        };
        let Self {
            expert_cfg,
            dl_mcs,
            ues,
            cells,
            ..
        } = self;
        let cell = cell_entry_mut(cells, grant.cell_index);
        assert!(grant.max_nof_rbs > 0, "PDSCH grant for ue={} without RBs", grant.ue_index);
        if let GrantKind::NewTx { nof_bytes } = grant.kind {
            assert!(nof_bytes > 0, "Zero-size PDSCH grant for ue={}", grant.ue_index);
        }

        let params = cell.params;
        let cell_index = params.cell_index;
        let dir = LinkDirection::Downlink;
        let pdsch_slot = pdcch_slot + params.k0 as u32;

        let symbols = grant.symbols.unwrap_or(params.pdsch_symbols);
        // A cached grid shortage only holds for the default symbol range
        let default_symbols = symbols == params.pdsch_symbols;
        match find_cached(&cell.no_pdsch_space, pdsch_slot) {
            Some(AllocStatus::NoGridSpace) if !default_symbols => {}
            Some(status) => return AllocResult::failure(status),
            None => {}
        }
        if cell.dl_attempts_count >= expert_cfg.max_pdschs_per_slot
            || cell.grid.borrow().slot_grants(pdsch_slot).dl.is_full()
        {
            mark_no_space(&mut cell.no_pdsch_space, pdsch_slot, AllocStatus::NoGridSpace, dir);
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }
        if !params.has_pdsch_room(pdsch_slot, &symbols) {
            if grant.symbols.is_some() {
                return AllocResult::failure(AllocStatus::InvalidRequest);
            }
            mark_no_space(&mut cell.no_pdsch_space, pdsch_slot, AllocStatus::NoGridSpace, dir);
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }
        // One PDSCH per UE and slot
        if cell.grid.borrow().slot_grants(pdsch_slot).dl.iter().any(|g| g.ue_index == grant.ue_index) {
            debug!("ue={} already has a PDSCH at slot {}", grant.ue_index, pdsch_slot);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        }

        // UE and HARQ state
        let mut ue_db = ues.borrow_mut();
        let Some(ue) = ue_db.get_mut(grant.ue_index) else {
            debug!("PDSCH grant for unknown ue={}", grant.ue_index);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        };
        let rnti = ue.crnti();
        let Some(ue_cell) = ue.find_cell_mut(cell_index) else {
            debug!("ue={} has no cell {}", grant.ue_index, cell_index);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        };
        let nof_re = nof_re_per_prb(symbols.length(), params.nof_dmrs_symbols);
        let (harq_id, nof_rbs, is_retx) = match grant.kind {
            GrantKind::NewTx { nof_bytes } => {
                let Some(harq_id) = ue_cell.harqs.find_empty_dl_harq() else {
                    return AllocResult::failure(AllocStatus::InvalidRequest);
                };
                let max_rbs = grant.max_nof_rbs.min(params.nof_rbs as u32);
                (harq_id, nof_prbs_for_bytes(dl_mcs, nof_re, nof_bytes, max_rbs), false)
            }
            GrantKind::Retx { harq_id } => {
                let h = ue_cell.harqs.dl_harq(harq_id);
                if !h.has_pending_retx()
                    || h.nof_rbs() as u32 > grant.max_nof_rbs
                    || h.symbols().length() != symbols.length()
                {
                    return AllocResult::failure(AllocStatus::InvalidRequest);
                }
                (harq_id, h.nof_rbs() as u32, true)
            }
        };

        // Frequency domain search, read-only
        let rbs = {
            let grid = cell.grid.borrow();
            match grid.find_free_rbs(pdsch_slot, dir, symbols, nof_rbs as u16) {
                Some(rbs) if !is_retx || rbs.length() as u32 == nof_rbs => rbs,
                _ => {
                    if default_symbols && grid.nof_free_rbs(pdsch_slot, dir, symbols) == 0 {
                        mark_no_space(&mut cell.no_pdsch_space, pdsch_slot, AllocStatus::NoGridSpace, dir);
                    }
                    return AllocResult::failure(AllocStatus::NoGridSpace);
                }
            }
        };

        // PDCCH
        let dci = DciRequest {
            rnti,
            ue_index: grant.ue_index,
            direction: dir,
            aggregation_level: expert_cfg.pdcch_aggregation_level,
        };
        if !cell.pdcch.borrow_mut().try_reserve(cell_index, pdcch_slot, &dci) {
            if cell.pdcch.borrow().is_exhausted(cell_index, pdcch_slot, dir) {
                mark_no_space(&mut cell.no_pdsch_space, pdsch_slot, AllocStatus::NoPdcchSpace, dir);
            }
            return AllocResult::failure(AllocStatus::NoPdcchSpace);
        }

        // HARQ-ACK, first K1 candidate with room
        let mut uci_slot = None;
        {
            let mut uci = cell.uci.borrow_mut();
            for &k1 in &expert_cfg.k1_candidates {
                let candidate = pdsch_slot + k1 as u32;
                if params.has_pucch_room(candidate)
                    && uci.try_reserve(cell_index, candidate, grant.ue_index, rnti, UciKind::HarqAck { harq_id })
                {
                    uci_slot = Some(candidate);
                    break;
                }
            }
        }
        let Some(uci_slot) = uci_slot else {
            cell.pdcch.borrow_mut().cancel_last(cell_index, pdcch_slot);
            return AllocResult::failure(AllocStatus::NoUciSpace);
        };

        // Resource grid
        if !cell.grid.borrow_mut().try_reserve(pdsch_slot, dir, rbs, symbols) {
            cell.uci.borrow_mut().cancel_last(cell_index, uci_slot);
            cell.pdcch.borrow_mut().cancel_last(cell_index, pdcch_slot);
            if default_symbols && cell.grid.borrow().nof_free_rbs(pdsch_slot, dir, symbols) == 0 {
                mark_no_space(&mut cell.no_pdsch_space, pdsch_slot, AllocStatus::NoGridSpace, dir);
            }
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }

        // Commit
        let tbs = if is_retx {
            ue_cell.harqs.dl_harq(harq_id).tbs_bytes()
        } else {
            tbs_bytes(dl_mcs, nof_re, rbs.length() as u32)
        };
        if is_retx {
            ue_cell.harqs.new_dl_retx(harq_id, pdsch_slot, uci_slot);
        } else {
            ue_cell
                .harqs
                .new_dl_tx(harq_id, pdsch_slot, uci_slot, rbs.length(), symbols, expert_cfg.dl_mcs, tbs);
        }
        let nof_retxs = ue_cell.harqs.dl_harq(harq_id).nof_retxs();
        if !is_retx {
            ue.drain_dl_bytes(tbs);
        }

        let info = DlGrantInfo {
            ue_index: grant.ue_index,
            rnti,
            slice_id,
            harq_id,
            pdsch_slot,
            uci_slot,
            rbs,
            symbols,
            mcs: expert_cfg.dl_mcs,
            tbs_bytes: tbs,
            nof_retxs,
        };
        // Room checked above.
        let _ = cell.grid.borrow_mut().slot_grants_mut(pdsch_slot).dl.push(info);
        cell.dl_attempts_count += 1;

        debug!(
            "ue={} rnti={} PDSCH at slot {}: h_id={} rbs={} tbs={} retx={} ack_slot={}",
            grant.ue_index, rnti, pdsch_slot, harq_id, rbs, tbs, nof_retxs, uci_slot
        );
        AllocResult::success(rbs.length() as u32)
    }

    /// Allocate a PUSCH grant in the slot `k2` after the current one
    pub fn allocate_ul_grant(&mut self, grant: &UePuschGrant, slice_id: RanSliceId) -> AllocResult {
        let Some(pdcch_slot) = self.last_slot else {
            panic!("PUSCH allocation before the first slot indication");
        };
        let Self {
            expert_cfg,
            ul_mcs,
            ues,
            cells,
            ..
        } = self;
        let cell = cell_entry_mut(cells, grant.cell_index);
        assert!(
            grant.k2 as usize <= SCHEDULER_MAX_K2,
            "k2={} exceeds the scheduler lookahead {}",
            grant.k2,
            SCHEDULER_MAX_K2
        );
        assert!(grant.max_nof_rbs > 0, "PUSCH grant for ue={} without RBs", grant.ue_index);
        if let GrantKind::NewTx { nof_bytes } = grant.kind {
            assert!(nof_bytes > 0, "Zero-size PUSCH grant for ue={}", grant.ue_index);
        }

        let params = cell.params;
        let cell_index = params.cell_index;
        let dir = LinkDirection::Uplink;
        let pusch_slot = pdcch_slot + grant.k2 as u32;

        if cell.ul_pdcch_exhausted == Some(pdcch_slot) {
            return AllocResult::failure(AllocStatus::NoPdcchSpace);
        }
        let symbols = grant.symbols.unwrap_or(params.pusch_symbols);
        let default_symbols = symbols == params.pusch_symbols;
        match find_cached(&cell.no_pusch_space, pusch_slot) {
            Some(AllocStatus::NoGridSpace) if !default_symbols => {}
            Some(status) => return AllocResult::failure(status),
            None => {}
        }
        if cell.ul_attempts_count >= expert_cfg.max_puschs_per_slot {
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }
        if cell.grid.borrow().slot_grants(pusch_slot).ul.is_full() {
            mark_no_space(&mut cell.no_pusch_space, pusch_slot, AllocStatus::NoGridSpace, dir);
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }
        if !params.has_pusch_room(pusch_slot, &symbols) {
            if grant.symbols.is_some() {
                return AllocResult::failure(AllocStatus::InvalidRequest);
            }
            mark_no_space(&mut cell.no_pusch_space, pusch_slot, AllocStatus::NoGridSpace, dir);
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }
        // One PUSCH per UE and slot, even when requested from different PDCCH slots
        if cell.grid.borrow().slot_grants(pusch_slot).ul.iter().any(|g| g.ue_index == grant.ue_index) {
            debug!("ue={} already has a PUSCH at slot {}", grant.ue_index, pusch_slot);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        }

        // UE and HARQ state
        let mut ue_db = ues.borrow_mut();
        let Some(ue) = ue_db.get_mut(grant.ue_index) else {
            debug!("PUSCH grant for unknown ue={}", grant.ue_index);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        };
        let rnti = ue.crnti();
        let Some(ue_cell) = ue.find_cell_mut(cell_index) else {
            debug!("ue={} has no cell {}", grant.ue_index, cell_index);
            return AllocResult::failure(AllocStatus::InvalidRequest);
        };
        let nof_re = nof_re_per_prb(symbols.length(), params.nof_dmrs_symbols);
        let (harq_id, nof_rbs, is_retx) = match grant.kind {
            GrantKind::NewTx { nof_bytes } => {
                let Some(harq_id) = ue_cell.harqs.find_empty_ul_harq() else {
                    return AllocResult::failure(AllocStatus::InvalidRequest);
                };
                let max_rbs = grant.max_nof_rbs.min(params.nof_rbs as u32);
                (harq_id, nof_prbs_for_bytes(ul_mcs, nof_re, nof_bytes, max_rbs), false)
            }
            GrantKind::Retx { harq_id } => {
                let h = ue_cell.harqs.ul_harq(harq_id);
                if !h.has_pending_retx()
                    || h.nof_rbs() as u32 > grant.max_nof_rbs
                    || h.symbols().length() != symbols.length()
                {
                    return AllocResult::failure(AllocStatus::InvalidRequest);
                }
                (harq_id, h.nof_rbs() as u32, true)
            }
        };

        let rbs = {
            let grid = cell.grid.borrow();
            match grid.find_free_rbs(pusch_slot, dir, symbols, nof_rbs as u16) {
                Some(rbs) if !is_retx || rbs.length() as u32 == nof_rbs => rbs,
                _ => {
                    if default_symbols && grid.nof_free_rbs(pusch_slot, dir, symbols) == 0 {
                        mark_no_space(&mut cell.no_pusch_space, pusch_slot, AllocStatus::NoGridSpace, dir);
                    }
                    return AllocResult::failure(AllocStatus::NoGridSpace);
                }
            }
        };

        // PDCCH. Exhaustion is a property of the PDCCH slot, which other K2
        // values share.
        let dci = DciRequest {
            rnti,
            ue_index: grant.ue_index,
            direction: dir,
            aggregation_level: expert_cfg.pdcch_aggregation_level,
        };
        if !cell.pdcch.borrow_mut().try_reserve(cell_index, pdcch_slot, &dci) {
            if cell.pdcch.borrow().is_exhausted(cell_index, pdcch_slot, dir) {
                trace!("UL PDCCH exhausted at slot {}", pdcch_slot);
                cell.ul_pdcch_exhausted = Some(pdcch_slot);
            }
            return AllocResult::failure(AllocStatus::NoPdcchSpace);
        }

        // UCI pending in the PUSCH slot moves onto the PUSCH
        if !cell
            .uci
            .borrow_mut()
            .try_reserve(cell_index, pusch_slot, grant.ue_index, rnti, UciKind::PuschMultiplexing)
        {
            cell.pdcch.borrow_mut().cancel_last(cell_index, pdcch_slot);
            return AllocResult::failure(AllocStatus::NoUciSpace);
        }

        if !cell.grid.borrow_mut().try_reserve(pusch_slot, dir, rbs, symbols) {
            cell.uci.borrow_mut().cancel_last(cell_index, pusch_slot);
            cell.pdcch.borrow_mut().cancel_last(cell_index, pdcch_slot);
            if default_symbols && cell.grid.borrow().nof_free_rbs(pusch_slot, dir, symbols) == 0 {
                mark_no_space(&mut cell.no_pusch_space, pusch_slot, AllocStatus::NoGridSpace, dir);
            }
            return AllocResult::failure(AllocStatus::NoGridSpace);
        }

        // Commit
        let tbs = if is_retx {
            ue_cell.harqs.ul_harq(harq_id).tbs_bytes()
        } else {
            tbs_bytes(ul_mcs, nof_re, rbs.length() as u32)
        };
        if is_retx {
            ue_cell.harqs.new_ul_retx(harq_id, pusch_slot);
        } else {
            ue_cell
                .harqs
                .new_ul_tx(harq_id, pusch_slot, rbs.length(), symbols, expert_cfg.ul_mcs, tbs);
        }
        let nof_retxs = ue_cell.harqs.ul_harq(harq_id).nof_retxs();
        if !is_retx {
            ue.drain_ul_bytes(tbs);
        }

        let info = UlGrantInfo {
            ue_index: grant.ue_index,
            rnti,
            slice_id,
            harq_id,
            pusch_slot,
            rbs,
            symbols,
            mcs: expert_cfg.ul_mcs,
            tbs_bytes: tbs,
            nof_retxs,
            uci_harq_ids: 0,
        };
        // Room checked above.
        let _ = cell.grid.borrow_mut().slot_grants_mut(pusch_slot).ul.push(info);
        cell.ul_attempts_count += 1;

        debug!(
            "ue={} rnti={} PUSCH at slot {}: h_id={} rbs={} tbs={} retx={}",
            grant.ue_index, rnti, pusch_slot, harq_id, rbs, tbs, nof_retxs
        );
        AllocResult::success(rbs.length() as u32)
    }

    #[cfg(test)]
    fn no_space_cache_len(&self, cell_index: DuCellIndex, dir: LinkDirection) -> usize {
        let cell = self.cells[cell_index.as_usize()].as_ref().unwrap();
        match dir {
            LinkDirection::Downlink => cell.no_pdsch_space.len(),
            LinkDirection::Uplink => cell.no_pusch_space.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ue_scheduling::test_utils::{fdd_cell, GridTestBench};
    use common::{DuUeIndex, HarqId, OfdmSymbolRange, RbInterval};
    use rand::Rng;

    fn slice0() -> RanSliceId {
        RanSliceId::new(0)
    }

    #[test]
    fn test_dl_grant_reserves_all_resources() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        bench.set_dl_bytes(ue, 1000);

        let grant = bench.dl_grant(ue, 1000);
        let result = bench.alloc.allocate_dl_grant(&grant, slice0());
        assert_eq!(result.status, AllocStatus::Success);

        let slot = bench.slot;
        let info = bench.grid.borrow().slot_grants(slot).dl[0];
        assert_eq!(info.rbs.length() as u32, result.alloc_nof_rbs);
        assert!(info.tbs_bytes >= 1000);
        assert_eq!(info.uci_slot, slot + 4);
        assert_eq!(info.nof_retxs, 0);
        assert_eq!(
            bench.grid.borrow().occupancy(slot, LinkDirection::Downlink),
            result.alloc_nof_rbs as usize * info.symbols.length() as usize
        );
        assert_eq!(bench.pdcch.borrow().inner.pdcchs(slot, LinkDirection::Downlink).len(), 1);

        let pucchs: Vec<_> = bench.uci.borrow().inner.pucchs(slot + 4).collect();
        assert_eq!(pucchs.len(), 1);
        assert_eq!(pucchs[0].harq_ids, 1u16 << info.harq_id.value());

        let ues = bench.ues.borrow();
        let ue = ues.get(ue).unwrap();
        assert_eq!(ue.pending_dl_newtx_bytes(), 0);
        assert!(!ue.find_cell(bench.params.cell_index).unwrap().harqs.dl_harq(info.harq_id).is_empty());
    }

    #[test]
    fn test_invalid_requests_touch_nothing() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);

        let unknown = bench.dl_grant(DuUeIndex::new(7), 100);
        assert_eq!(bench.alloc.allocate_dl_grant(&unknown, slice0()).status, AllocStatus::InvalidRequest);

        let mut retx = bench.dl_grant(ue, 100);
        retx.kind = GrantKind::Retx { harq_id: HarqId::new(0) };
        assert_eq!(bench.alloc.allocate_dl_grant(&retx, slice0()).status, AllocStatus::InvalidRequest);

        let ul_unknown = bench.ul_grant(DuUeIndex::new(7), 100, 4);
        assert_eq!(bench.alloc.allocate_ul_grant(&ul_unknown, slice0()).status, AllocStatus::InvalidRequest);

        assert_eq!(bench.nof_reserve_calls(), (0, 0, 0));
    }

    #[test]
    fn test_pdcch_exhaustion_is_cached() {
        let expert = SchedulerExpertConfig {
            pdcch_aggregation_level: 16,
            ..Default::default()
        };
        let mut bench = GridTestBench::new(expert, fdd_cell());
        let ues: Vec<DuUeIndex> = (0..3).map(|i| bench.add_ue(i)).collect();
        for &ue in &ues {
            bench.set_dl_bytes(ue, 100);
        }

        let r0 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[0], 100), slice0());
        assert!(r0.is_success());
        let r1 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[1], 100), slice0());
        assert_eq!(r1.status, AllocStatus::NoPdcchSpace);
        let calls = bench.nof_reserve_calls();
        assert_eq!(calls.0, 2);

        let r2 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[2], 100), slice0());
        assert_eq!(r2.status, AllocStatus::NoPdcchSpace);
        assert_eq!(bench.nof_reserve_calls(), calls);
        assert_eq!(bench.alloc.no_space_cache_len(bench.params.cell_index, LinkDirection::Downlink), 1);

        // The next slot starts with a fresh CORESET
        bench.next_slot();
        let r1 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[1], 100), slice0());
        assert!(r1.is_success());
    }

    #[test]
    fn test_grid_exhaustion_is_cached() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ues: Vec<DuUeIndex> = (0..3).map(|i| bench.add_ue(i)).collect();
        bench.set_dl_bytes(ues[0], 10_000_000);
        bench.set_dl_bytes(ues[1], 100);
        bench.set_dl_bytes(ues[2], 100);

        let r0 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[0], 10_000_000), slice0());
        assert_eq!(r0.alloc_nof_rbs, bench.params.nof_rbs as u32);

        let r1 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[1], 100), slice0());
        assert_eq!(r1.status, AllocStatus::NoGridSpace);
        let calls = bench.nof_reserve_calls();
        assert_eq!(calls, (1, 1, 1));
        let r2 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[2], 100), slice0());
        assert_eq!(r2.status, AllocStatus::NoGridSpace);
        assert_eq!(bench.nof_reserve_calls(), calls);
    }

    #[test]
    fn test_custom_symbols_ignore_cached_grid_shortage() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ues: Vec<DuUeIndex> = (0..3).map(|i| bench.add_ue(i)).collect();
        for &ue in &ues {
            bench.set_dl_bytes(ue, 10_000_000);
        }

        let mut head = bench.dl_grant(ues[0], 10_000_000);
        head.symbols = Some(OfdmSymbolRange::new(2, 8));
        let r0 = bench.alloc.allocate_dl_grant(&head, slice0());
        assert_eq!(r0.alloc_nof_rbs, bench.params.nof_rbs as u32);

        let r1 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[1], 100), slice0());
        assert_eq!(r1.status, AllocStatus::NoGridSpace);
        assert_eq!(bench.alloc.no_space_cache_len(bench.params.cell_index, LinkDirection::Downlink), 1);

        // The tail of the slot is still free
        let mut tail = bench.dl_grant(ues[2], 10_000_000);
        tail.symbols = Some(OfdmSymbolRange::new(8, 14));
        let r2 = bench.alloc.allocate_dl_grant(&tail, slice0());
        assert!(r2.is_success());
        assert_eq!(bench.grid.borrow().slot_grants(bench.slot).dl[1].symbols, OfdmSymbolRange::new(8, 14));

        // Default range requests are still refused from the cache
        let calls = bench.nof_reserve_calls();
        let r3 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[1], 100), slice0());
        assert_eq!(r3.status, AllocStatus::NoGridSpace);
        assert_eq!(bench.nof_reserve_calls(), calls);
    }

    #[test]
    fn test_second_pdsch_for_same_ue_rejected() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        bench.set_dl_bytes(ue, 5000);

        let mut grant = bench.dl_grant(ue, 5000);
        grant.max_nof_rbs = 2;
        assert!(bench.alloc.allocate_dl_grant(&grant, slice0()).is_success());
        let calls = bench.nof_reserve_calls();

        let again = bench.alloc.allocate_dl_grant(&bench.dl_grant(ue, 5000), slice0());
        assert_eq!(again.status, AllocStatus::InvalidRequest);
        assert_eq!(bench.nof_reserve_calls(), calls);
        assert_eq!(bench.grid.borrow().slot_grants(bench.slot).dl.len(), 1);
        // Not a property of the slot
        assert_eq!(bench.alloc.no_space_cache_len(bench.params.cell_index, LinkDirection::Downlink), 0);
    }

    #[test]
    fn test_second_pusch_for_same_ue_rejected_across_pdcch_slots() {
        let mut cell_cfg = fdd_cell();
        cell_cfg.k2_candidates = vec![4, 5];
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), cell_cfg);
        let ue = bench.add_ue(0);
        let other = bench.add_ue(1);
        bench.set_ul_bytes(ue, 5000);
        bench.set_ul_bytes(other, 100);

        let mut grant = bench.ul_grant(ue, 5000, 5);
        grant.max_nof_rbs = 2;
        assert!(bench.alloc.allocate_ul_grant(&grant, slice0()).is_success());
        let pusch_slot = bench.slot + 5;

        bench.next_slot();
        let calls = bench.nof_reserve_calls();
        let again = bench.alloc.allocate_ul_grant(&bench.ul_grant(ue, 5000, 4), slice0());
        assert_eq!(again.status, AllocStatus::InvalidRequest);
        assert_eq!(bench.nof_reserve_calls(), calls);

        // Other UEs still fit in the same PUSCH slot
        assert!(bench.alloc.allocate_ul_grant(&bench.ul_grant(other, 100, 4), slice0()).is_success());
        let grid = bench.grid.borrow();
        let ue_indexes: Vec<_> = grid.slot_grants(pusch_slot).ul.iter().map(|g| g.ue_index).collect();
        assert_eq!(ue_indexes, vec![ue, other]);
    }

    #[test]
    fn test_failed_allocation_is_atomic() {
        let expert = SchedulerExpertConfig {
            max_pucchs_per_slot: 1,
            k1_candidates: vec![4],
            ..Default::default()
        };
        let mut bench = GridTestBench::new(expert, fdd_cell());
        let ue0 = bench.add_ue(0);
        let ue1 = bench.add_ue(1);
        bench.set_dl_bytes(ue0, 500);
        bench.set_dl_bytes(ue1, 500);
        assert!(bench.alloc.allocate_dl_grant(&bench.dl_grant(ue0, 500), slice0()).is_success());

        let slot = bench.slot;
        let grid_before = bench.grid.borrow().snapshot(slot, LinkDirection::Downlink);
        let pdcch_before = bench.pdcch.borrow().inner.snapshot(slot);
        let uci_before = bench.uci.borrow().inner.snapshot(slot + 4);

        let r1 = bench.alloc.allocate_dl_grant(&bench.dl_grant(ue1, 500), slice0());
        assert_eq!(r1.status, AllocStatus::NoUciSpace);
        assert_eq!(bench.grid.borrow().snapshot(slot, LinkDirection::Downlink), grid_before);
        assert_eq!(bench.pdcch.borrow().inner.snapshot(slot), pdcch_before);
        assert_eq!(bench.uci.borrow().inner.snapshot(slot + 4), uci_before);
        assert_eq!(bench.grid.borrow().slot_grants(slot).dl.len(), 1);

        let ues = bench.ues.borrow();
        let ue1 = ues.get(ue1).unwrap();
        assert_eq!(ue1.pending_dl_newtx_bytes(), 500);
        assert_eq!(ue1.find_cell(bench.params.cell_index).unwrap().harqs.nof_busy_dl_harqs(), 0);
    }

    #[test]
    fn test_random_grants_never_overlap() {
        let mut rng = rand::thread_rng();
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ues: Vec<DuUeIndex> = (0..8).map(|i| bench.add_ue(i)).collect();

        for _ in 0..50 {
            for &ue in &ues {
                let bytes = rng.gen_range(1..20_000u32);
                bench.set_dl_bytes(ue, bytes);
                let mut grant = bench.dl_grant(ue, bytes);
                grant.max_nof_rbs = rng.gen_range(1..=bench.params.nof_rbs as u32);
                let result = bench.alloc.allocate_dl_grant(&grant, slice0());
                if result.is_success() {
                    assert!(result.alloc_nof_rbs >= 1 && result.alloc_nof_rbs <= grant.max_nof_rbs);
                }
            }

            let grid = bench.grid.borrow();
            let grants = &grid.slot_grants(bench.slot).dl;
            for (i, a) in grants.iter().enumerate() {
                for b in grants.iter().skip(i + 1) {
                    assert!(!a.rbs.overlaps(&b.rbs), "{} overlaps {}", a.rbs, b.rbs);
                    assert_ne!(a.ue_index, b.ue_index);
                }
            }
            let total: u32 = grants.iter().map(|g| g.rbs.length() as u32).sum();
            assert!(total <= bench.params.nof_rbs as u32);
            assert_eq!(
                bench.pdcch.borrow().inner.pdcchs(bench.slot, LinkDirection::Downlink).len(),
                grants.len()
            );
            drop(grid);
            bench.next_slot();
        }
    }

    #[test]
    fn test_dl_retx_reuses_rb_count() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        bench.set_dl_bytes(ue, 2000);
        let first = bench.alloc.allocate_dl_grant(&bench.dl_grant(ue, 2000), slice0());
        assert!(first.is_success());
        let info = bench.grid.borrow().slot_grants(bench.slot).dl[0];

        for _ in 0..4 {
            bench.next_slot();
        }
        {
            let mut ues = bench.ues.borrow_mut();
            let harqs = &mut ues.get_mut(ue).unwrap().find_cell_mut(bench.params.cell_index).unwrap().harqs;
            let feedback = harqs.dl_ack_info(info.uci_slot, info.harq_id, false).unwrap();
            assert_eq!(feedback.slot_tx, info.pdsch_slot);
        }
        bench.next_slot();

        let mut retx = bench.dl_grant(ue, 1);
        retx.kind = GrantKind::Retx { harq_id: info.harq_id };
        let result = bench.alloc.allocate_dl_grant(&retx, slice0());
        assert_eq!(result.alloc_nof_rbs, first.alloc_nof_rbs);
        let retx_info = bench.grid.borrow().slot_grants(bench.slot).dl[0];
        assert_eq!(retx_info.nof_retxs, 1);
        assert_eq!(retx_info.tbs_bytes, info.tbs_bytes);
    }

    #[test]
    fn test_ul_grant_carries_pending_harq_ack() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        bench.set_dl_bytes(ue, 500);
        bench.set_ul_bytes(ue, 500);
        assert!(bench.alloc.allocate_dl_grant(&bench.dl_grant(ue, 500), slice0()).is_success());
        let pusch_slot = bench.slot + 4;
        assert_eq!(bench.uci.borrow().inner.pucchs(pusch_slot).count(), 1);

        let result = bench.alloc.allocate_ul_grant(&bench.ul_grant(ue, 500, 4), slice0());
        assert!(result.is_success());
        assert_eq!(bench.uci.borrow().inner.pucchs(pusch_slot).count(), 0);
        assert_ne!(bench.uci.borrow().inner.pusch_harq_ids(pusch_slot, ue), 0);
        // PUCCH guard bands are excluded from PUSCH
        let info = bench.grid.borrow().slot_grants(pusch_slot).ul[0];
        assert!(info.rbs.start >= bench.params.pucch_guard_rbs);
        assert_eq!(bench.ues.borrow().get(ue).unwrap().pending_ul_newtx_bytes(), 0);
    }

    #[test]
    fn test_no_space_cache_bounded_by_max_k0() {
        let mut cell_cfg = fdd_cell();
        cell_cfg.k0 = SCHEDULER_MAX_K0 as u8;
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), cell_cfg);
        let ues: Vec<DuUeIndex> = (0..41).map(|i| bench.add_ue(i)).collect();
        for &ue in &ues {
            bench.set_dl_bytes(ue, 10_000_000);
        }

        for i in 0..40 {
            let full = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[i], 10_000_000), slice0());
            assert!(full.is_success());
            let none = bench.alloc.allocate_dl_grant(&bench.dl_grant(ues[i + 1], 10_000_000), slice0());
            assert_eq!(none.status, AllocStatus::NoGridSpace);
            let cache_len = bench.alloc.no_space_cache_len(bench.params.cell_index, LinkDirection::Downlink);
            assert_eq!(cache_len, (i + 1).min(SCHEDULER_MAX_K0 + 1));
            bench.next_slot();
        }
    }

    #[test]
    fn test_ul_pdcch_exhaustion_does_not_block_other_pdcch_slots() {
        let expert = SchedulerExpertConfig {
            pdcch_aggregation_level: 16,
            ..Default::default()
        };
        let mut cell_cfg = fdd_cell();
        cell_cfg.k2_candidates = vec![4, 5];
        let mut bench = GridTestBench::new(expert, cell_cfg);
        let ue0 = bench.add_ue(0);
        let ue1 = bench.add_ue(1);
        bench.set_ul_bytes(ue0, 100);
        bench.set_ul_bytes(ue1, 100);

        assert!(bench.alloc.allocate_ul_grant(&bench.ul_grant(ue0, 100, 4), slice0()).is_success());
        let r = bench.alloc.allocate_ul_grant(&bench.ul_grant(ue1, 100, 5), slice0());
        assert_eq!(r.status, AllocStatus::NoPdcchSpace);

        // Same PUSCH slot, reached from the next PDCCH slot
        bench.next_slot();
        assert!(bench.alloc.allocate_ul_grant(&bench.ul_grant(ue1, 100, 4), slice0()).is_success());
        let pusch_slot = bench.slot + 4;
        let grid = bench.grid.borrow();
        let grants = &grid.slot_grants(pusch_slot).ul;
        assert_eq!(grants.len(), 1);
        assert!(!grants[0].rbs.overlaps(&RbInterval::new(0, bench.params.pucch_guard_rbs)));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_unregistered_cell_panics() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        let mut grant = bench.dl_grant(ue, 100);
        grant.cell_index = DuCellIndex::new(1);
        bench.alloc.allocate_dl_grant(&grant, slice0());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_cell_panics() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let (pdcch, uci, grid) = (bench.pdcch.clone(), bench.uci.clone(), bench.grid.clone());
        bench.alloc.add_cell(DuCellIndex::new(0), pdcch, uci, grid);
    }

    #[test]
    #[should_panic(expected = "exceeds the maximum")]
    fn test_cell_beyond_max_cells_panics() {
        let expert = SchedulerExpertConfig {
            max_nof_cells: 1,
            ..Default::default()
        };
        let mut bench = GridTestBench::new(expert, fdd_cell());
        let mut cell_cfg = fdd_cell();
        cell_cfg.cell_index = DuCellIndex::new(1);
        let params = cell_cfg.validate(&SchedulerExpertConfig::default()).unwrap();
        let grid = Rc::new(RefCell::new(CellResourceAllocator::new(params)));
        let (pdcch, uci) = (bench.pdcch.clone(), bench.uci.clone());
        bench.alloc.add_cell(DuCellIndex::new(1), pdcch, uci, grid);
    }

    #[test]
    #[should_panic(expected = "exceeds the scheduler lookahead")]
    fn test_k0_beyond_lookahead_panics() {
        let expert = SchedulerExpertConfig::default();
        let cell_cfg = fdd_cell();
        let mut params = cell_cfg.validate(&expert).unwrap();
        params.k0 = SCHEDULER_MAX_K0 as u8 + 1;
        GridTestBench::with_params(expert, params, &cell_cfg);
    }

    #[test]
    #[should_panic(expected = "exceeds the scheduler lookahead")]
    fn test_k2_beyond_lookahead_panics() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        let grant = bench.ul_grant(ue, 100, SCHEDULER_MAX_K2 as u8 + 1);
        bench.alloc.allocate_ul_grant(&grant, slice0());
    }

    #[test]
    #[should_panic(expected = "Zero-size PDSCH grant")]
    fn test_zero_size_grant_panics() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue = bench.add_ue(0);
        let grant = bench.dl_grant(ue, 0);
        bench.alloc.allocate_dl_grant(&grant, slice0());
    }

    #[test]
    #[should_panic(expected = "does not follow")]
    fn test_slot_indication_must_increase() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let slot = bench.slot;
        bench.alloc.slot_indication(slot);
    }
}
