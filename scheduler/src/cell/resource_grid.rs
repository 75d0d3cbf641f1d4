//! Cell Resource Grid
//! 
//! Occupancy bitmap of the DL and UL resource grids of one cell, kept for a
//! window of upcoming slots, plus the grants committed in each of them.

use super::slot_ring::SlotRing;
use crate::config::CellParams;
use crate::result::{DlGrantInfo, UlGrantInfo};
use crate::{MAX_PDSCHS_PER_SLOT, MAX_PUSCHS_PER_SLOT, RING_ALLOCATOR_SIZE};
use common::{LinkDirection, OfdmSymbolRange, RbInterval, SlotPoint, NOF_OFDM_SYMBOLS_PER_SLOT};
use ndarray::{s, Array2, Array3};
use tracing::{trace, warn};

/// Grants committed in one slot
#[derive(Debug, Clone, Default)]
pub struct SlotGrants {
    pub dl: heapless::Vec<DlGrantInfo, MAX_PDSCHS_PER_SLOT>,
    pub ul: heapless::Vec<UlGrantInfo, MAX_PUSCHS_PER_SLOT>,
}

impl SlotGrants {
    fn clear(&mut self) {
        self.dl.clear();
        self.ul.clear();
    }
}

/// Resource grid allocator of one cell
#[derive(Debug, Clone)]
pub struct CellResourceAllocator {
    params: CellParams,
    /// DL occupancy: [ring slot, symbol, RB]
    dl_grid: Array3<bool>,
    /// UL occupancy: [ring slot, symbol, RB]
    ul_grid: Array3<bool>,
    slots: SlotRing<SlotGrants>,
    nof_reserve_calls: u64,
}

impl CellResourceAllocator {
    /// Create the allocator. All grid memory is allocated here.
    pub fn new(params: CellParams) -> Self {
        let shape = (
            RING_ALLOCATOR_SIZE,
            NOF_OFDM_SYMBOLS_PER_SLOT as usize,
            params.nof_rbs as usize,
        );
        Self {
            params,
            dl_grid: Array3::from_elem(shape, false),
            ul_grid: Array3::from_elem(shape, false),
            slots: SlotRing::new(RING_ALLOCATOR_SIZE),
            nof_reserve_calls: 0,
        }
    }

    pub fn params(&self) -> &CellParams {
        &self.params
    }

    pub fn nof_rbs(&self) -> u16 {
        self.params.nof_rbs
    }

    /// First slot of the grid window
    pub fn current_slot(&self) -> Option<SlotPoint> {
        self.slots.current()
    }

    /// Number of reservation attempts made on this grid
    pub fn nof_reserve_calls(&self) -> u64 {
        self.nof_reserve_calls
    }

    /// Advance the grid window, clearing the slots that enter it
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        let Self {
            params,
            dl_grid,
            ul_grid,
            slots,
            ..
        } = self;
        slots.slot_indication(slot, |sl, idx, grants| {
            grants.clear();
            dl_grid.slice_mut(s![idx, .., ..]).fill(false);
            ul_grid.slice_mut(s![idx, .., ..]).fill(false);

            // PUCCH occupies the band edges of every UL slot
            let guard = params.pucch_guard_rbs as usize;
            if guard > 0 && params.has_pucch_room(sl) {
                let nof_rbs = params.nof_rbs as usize;
                let symbols = params.ul_symbols(sl).as_range();
                ul_grid.slice_mut(s![idx, symbols.clone(), 0..guard]).fill(true);
                ul_grid.slice_mut(s![idx, symbols, nof_rbs - guard..nof_rbs]).fill(true);
            }
        });
        trace!("Cell {} resource grid at slot {}", self.params.cell_index, slot);
    }

    fn grid(&self, dir: LinkDirection) -> &Array3<bool> {
        match dir {
            LinkDirection::Downlink => &self.dl_grid,
            LinkDirection::Uplink => &self.ul_grid,
        }
    }

    fn grid_mut(&mut self, dir: LinkDirection) -> &mut Array3<bool> {
        match dir {
            LinkDirection::Downlink => &mut self.dl_grid,
            LinkDirection::Uplink => &mut self.ul_grid,
        }
    }

    fn is_valid_region(&self, rbs: &RbInterval, symbols: &OfdmSymbolRange) -> bool {
        !rbs.is_empty()
            && rbs.stop <= self.params.nof_rbs
            && !symbols.is_empty()
            && symbols.stop <= NOF_OFDM_SYMBOLS_PER_SLOT
    }

    /// Mark a region as used. Fails without side effects if any of its
    /// resource elements is already in use.
    pub fn try_reserve(
        &mut self,
        slot: SlotPoint,
        dir: LinkDirection,
        rbs: RbInterval,
        symbols: OfdmSymbolRange,
    ) -> bool {
        self.nof_reserve_calls += 1;
        if !self.is_valid_region(&rbs, &symbols) {
            warn!("Invalid {} grid region RBs={} symbols={}", dir, rbs, symbols);
            return false;
        }
        let idx = self.slots.index_of(slot);
        let mut region = self
            .grid_mut(dir)
            .slice_mut(s![idx, symbols.as_range(), rbs.as_range()]);
        if region.iter().any(|&used| used) {
            return false;
        }
        region.fill(true);
        true
    }

    /// Release a previously reserved region
    pub fn release(&mut self, slot: SlotPoint, dir: LinkDirection, rbs: RbInterval, symbols: OfdmSymbolRange) {
        if !self.is_valid_region(&rbs, &symbols) {
            return;
        }
        let idx = self.slots.index_of(slot);
        self.grid_mut(dir)
            .slice_mut(s![idx, symbols.as_range(), rbs.as_range()])
            .fill(false);
    }

    fn is_rb_free(&self, grid: &Array3<bool>, idx: usize, rb: u16, symbols: &OfdmSymbolRange) -> bool {
        !grid
            .slice(s![idx, symbols.as_range(), rb as usize])
            .iter()
            .any(|&used| used)
    }

    /// Check whether a resource element is in use
    pub fn is_used(&self, slot: SlotPoint, dir: LinkDirection, rb: u16, symbol: u8) -> bool {
        let idx = self.slots.index_of(slot);
        self.grid(dir)[[idx, symbol as usize, rb as usize]]
    }

    /// Search a contiguous interval of RBs free over all `symbols`. Returns the
    /// first interval of at least `nof_rbs` RBs, trimmed to `nof_rbs`, or the
    /// largest free interval when none is long enough.
    pub fn find_free_rbs(
        &self,
        slot: SlotPoint,
        dir: LinkDirection,
        symbols: OfdmSymbolRange,
        nof_rbs: u16,
    ) -> Option<RbInterval> {
        if nof_rbs == 0 || symbols.is_empty() || symbols.stop > NOF_OFDM_SYMBOLS_PER_SLOT {
            return None;
        }
        let idx = self.slots.index_of(slot);
        let grid = self.grid(dir);
        let total = self.params.nof_rbs;

        let mut best: Option<RbInterval> = None;
        let mut start: Option<u16> = None;
        for rb in 0..=total {
            let free = rb < total && self.is_rb_free(grid, idx, rb, &symbols);
            match (free, start) {
                (true, None) => start = Some(rb),
                (false, Some(first)) => {
                    let interval = RbInterval::new(first, rb);
                    if interval.length() >= nof_rbs {
                        return Some(RbInterval::new(first, first + nof_rbs));
                    }
                    if best.map_or(true, |b| interval.length() > b.length()) {
                        best = Some(interval);
                    }
                    start = None;
                }
                _ => {}
            }
        }
        best
    }

    /// Number of RBs free over all `symbols`
    pub fn nof_free_rbs(&self, slot: SlotPoint, dir: LinkDirection, symbols: OfdmSymbolRange) -> u16 {
        if symbols.is_empty() || symbols.stop > NOF_OFDM_SYMBOLS_PER_SLOT {
            return 0;
        }
        let idx = self.slots.index_of(slot);
        let grid = self.grid(dir);
        (0..self.params.nof_rbs)
            .filter(|&rb| self.is_rb_free(grid, idx, rb, &symbols))
            .count() as u16
    }

    /// Number of resource elements in use
    pub fn occupancy(&self, slot: SlotPoint, dir: LinkDirection) -> usize {
        let idx = self.slots.index_of(slot);
        self.grid(dir)
            .slice(s![idx, .., ..])
            .iter()
            .filter(|&&used| used)
            .count()
    }

    /// Copy of the [symbol, RB] occupancy of a slot
    pub fn snapshot(&self, slot: SlotPoint, dir: LinkDirection) -> Array2<bool> {
        let idx = self.slots.index_of(slot);
        self.grid(dir).slice(s![idx, .., ..]).to_owned()
    }

    /// Grants committed in a slot
    pub fn slot_grants(&self, slot: SlotPoint) -> &SlotGrants {
        self.slots.get(slot)
    }

    pub fn slot_grants_mut(&mut self, slot: SlotPoint) -> &mut SlotGrants {
        self.slots.get_mut(slot)
    }
}
