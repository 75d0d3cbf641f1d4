//! UE Scheduler
//!
//! Per-slot driver of the UE grant decisions of all cells: processes the
//! pending indications, advances every collaborator to the new slot, runs
//! the slice policies for DL and then UL, and collects the cell result.

use super::event_manager::{EventStats, UeEventManager};
use super::slice_allocators::{DlSliceUeCellGridAllocator, UlSliceUeCellGridAllocator};
use super::ue_cell_grid_allocator::{SharedUeRepository, UeCellGridAllocator};
use crate::cell::CellResourceAllocator;
use crate::config::{CellConfiguration, CellParams, SchedulerExpertConfig};
use crate::pdcch::{CoresetConfig, PdcchResourceAllocatorImpl};
use crate::policy::{SchedulerPolicy, SchedulerTimeRr, SliceSchedContext};
use crate::result::SchedResult;
use crate::slicing::SliceScheduler;
use crate::uci::UciAllocatorImpl;
use crate::ue::{HarqConfig, UeRepository};
use crate::{SchedError, MAX_K2_CANDIDATES};
use common::{DuCellIndex, LinkDirection, SlotPoint, MAX_NOF_DU_CELLS};
use interfaces::IndicationSender;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tracing::{debug, info};

struct CellContext {
    params: CellParams,
    grid: Rc<RefCell<CellResourceAllocator>>,
    pdcch: Rc<RefCell<PdcchResourceAllocatorImpl>>,
    uci: Rc<RefCell<UciAllocatorImpl>>,
    slices: SliceScheduler,
    /// One policy per slice, in slice scheduling order
    policies: Vec<SchedulerTimeRr>,
    k2_candidates: heapless::Vec<u8, MAX_K2_CANDIDATES>,
    result: SchedResult,
}

impl CellContext {
    fn slot_indication(&mut self, slot: SlotPoint) {
        self.grid.borrow_mut().slot_indication(slot);
        self.pdcch.borrow_mut().slot_indication(slot);
        self.uci.borrow_mut().slot_indication(slot);
    }

    fn collect_result(&mut self, slot: SlotPoint) {
        let result = &mut self.result;
        result.reset(slot, self.params.cell_index);

        // Result containers are as large as the allocator rings
        let pdcch = self.pdcch.borrow();
        let _ = result.dl_pdcchs.extend_from_slice(pdcch.pdcchs(slot, LinkDirection::Downlink));
        let _ = result.ul_pdcchs.extend_from_slice(pdcch.pdcchs(slot, LinkDirection::Uplink));

        let grid = self.grid.borrow();
        let uci = self.uci.borrow();
        let grants = grid.slot_grants(slot);
        let _ = result.dl_grants.extend_from_slice(&grants.dl);
        for grant in grants.ul.iter() {
            let mut grant = *grant;
            grant.uci_harq_ids = uci.pusch_harq_ids(slot, grant.ue_index);
            let _ = result.ul_grants.push(grant);
        }
        for pucch in uci.pucchs(slot) {
            let _ = result.pucchs.push(pucch);
        }
    }
}

/// UE scheduler of all cells
pub struct UeScheduler {
    expert_cfg: SchedulerExpertConfig,
    ues: SharedUeRepository,
    ue_alloc: UeCellGridAllocator,
    event_mng: UeEventManager,
    cells: [Option<CellContext>; MAX_NOF_DU_CELLS],
    last_slot: Option<SlotPoint>,
}

impl UeScheduler {
    pub fn new(expert_cfg: SchedulerExpertConfig) -> Result<Self, SchedError> {
        expert_cfg.validate()?;
        let ues = Rc::new(RefCell::new(UeRepository::new(expert_cfg.max_nof_ues)));
        let ue_alloc = UeCellGridAllocator::new(&expert_cfg, ues.clone());
        let event_mng = UeEventManager::new(
            expert_cfg.indication_queue_size,
            expert_cfg.max_indications_per_slot,
            HarqConfig::from(&expert_cfg),
        );
        Ok(Self {
            expert_cfg,
            ues,
            ue_alloc,
            event_mng,
            cells: std::array::from_fn(|_| None),
            last_slot: None,
        })
    }

    /// Producer handle for UE configuration, buffer state and feedback
    pub fn indication_sender(&self) -> IndicationSender {
        self.event_mng.indication_sender()
    }

    /// Build the allocators of a cell and register them
    pub fn add_cell(&mut self, cell_cfg: &CellConfiguration) -> Result<(), SchedError> {
        let params = cell_cfg.validate(&self.expert_cfg)?;
        let cell_index = params.cell_index;
        if self.has_cell(cell_index) {
            return Err(SchedError::InvalidConfiguration(format!("Cell {} already exists", cell_index)));
        }
        let coreset = CoresetConfig::from_index(cell_cfg.coreset_index)?;
        let slices = SliceScheduler::new(&cell_cfg.slices, params.nof_rbs)?;
        let k2_candidates = heapless::Vec::from_slice(&cell_cfg.k2_candidates).map_err(|_| {
            SchedError::CapacityExceeded(format!("More than {} K2 candidates", MAX_K2_CANDIDATES))
        })?;
        let nof_slices = slices.nof_slices();
        let policies = (0..nof_slices)
            .map(|_| SchedulerTimeRr::new(&self.expert_cfg))
            .collect();

        let grid = Rc::new(RefCell::new(CellResourceAllocator::new(params)));
        let pdcch = Rc::new(RefCell::new(PdcchResourceAllocatorImpl::new(params, coreset, &self.expert_cfg)));
        let uci = Rc::new(RefCell::new(UciAllocatorImpl::new(params, &self.expert_cfg)));
        self.ue_alloc.add_cell(cell_index, pdcch.clone(), uci.clone(), grid.clone());

        self.cells[cell_index.as_usize()] = Some(CellContext {
            params,
            grid,
            pdcch,
            uci,
            slices,
            policies,
            k2_candidates,
            result: SchedResult::default(),
        });
        info!(
            "Cell {} added: {} RBs, {} CCEs, {} slices, TDD={}",
            cell_index,
            params.nof_rbs,
            coreset.nof_cces(),
            nof_slices,
            params.tdd.is_some()
        );
        Ok(())
    }

    pub fn has_cell(&self, cell_index: DuCellIndex) -> bool {
        self.cells
            .get(cell_index.as_usize())
            .is_some_and(|c| c.is_some())
    }

    pub fn cell_params(&self, cell_index: DuCellIndex) -> Option<&CellParams> {
        self.cells.get(cell_index.as_usize())?.as_ref().map(|c| &c.params)
    }

    pub fn ue_repository(&self) -> Ref<'_, UeRepository> {
        self.ues.borrow()
    }

    pub fn event_stats(&self) -> &EventStats {
        self.event_mng.stats()
    }

    /// Schedule one cell in `slot`. Called once per slot for every cell,
    /// with non-decreasing slots.
    pub fn run_slot(&mut self, slot: SlotPoint, cell_index: DuCellIndex) -> &SchedResult {
        let Self {
            ues,
            ue_alloc,
            event_mng,
            cells,
            last_slot,
            ..
        } = self;

        if *last_slot != Some(slot) {
            // First cell scheduled in this slot
            {
                let mut ue_db = ues.borrow_mut();
                event_mng.run(slot, &mut ue_db, |c| {
                    cells.get(c.as_usize()).is_some_and(|cell| cell.is_some())
                });
                ue_db.slot_indication(slot);
            }
            ue_alloc.slot_indication(slot);
            *last_slot = Some(slot);
        }

        let Some(cell) = cells.get_mut(cell_index.as_usize()).and_then(Option::as_mut) else {
            panic!("Cell {} is not registered in the UE scheduler", cell_index);
        };
        cell.slot_indication(slot);

        if cell.params.has_pdcch_room(slot) {
            for pos in 0..cell.slices.nof_slices() {
                let mut candidate = cell.slices.dl_candidate(pos, slot);
                let ctx = SliceSchedContext {
                    slot,
                    cell_index,
                    slice_id: candidate.id(),
                    k2_candidates: &cell.k2_candidates,
                };
                let mut alloc = DlSliceUeCellGridAllocator::new(ue_alloc, &mut candidate);
                cell.policies[pos].dl_sched(&mut alloc, &**ues, &ctx);
                if candidate.consumed_rbs() > 0 {
                    debug!(
                        "Cell {} slot {}: slice {} DL {}/{} RBs",
                        cell_index,
                        slot,
                        candidate.id(),
                        candidate.consumed_rbs(),
                        candidate.rb_budget()
                    );
                }
            }
            for pos in 0..cell.slices.nof_slices() {
                let mut candidate = cell.slices.ul_candidate(pos, slot);
                let ctx = SliceSchedContext {
                    slot,
                    cell_index,
                    slice_id: candidate.id(),
                    k2_candidates: &cell.k2_candidates,
                };
                let mut alloc = UlSliceUeCellGridAllocator::new(ue_alloc, &mut candidate);
                cell.policies[pos].ul_sched(&mut alloc, &**ues, &ctx);
                if candidate.consumed_rbs() > 0 {
                    debug!(
                        "Cell {} slot {}: slice {} UL {}/{} RBs",
                        cell_index,
                        slot,
                        candidate.id(),
                        candidate.consumed_rbs(),
                        candidate.rb_budget()
                    );
                }
            }
        }

        cell.collect_result(slot);
        &cell.result
    }
}
