//! PDCCH Resource Allocation
//! 
//! CCE bookkeeping of the UE-dedicated CORESET. The grid allocator only sees
//! the [`PdcchResourceAllocator`] trait.

mod coreset;
mod pdcch_allocator;

pub use coreset::{CoresetConfig, NOF_RES_PER_CCE};
pub use pdcch_allocator::{PdcchResourceAllocatorImpl, PdcchSlotSnapshot};

use common::{DuCellIndex, DuUeIndex, LinkDirection, Rnti, SlotPoint};

/// DCI to be placed in the CORESET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DciRequest {
    pub rnti: Rnti,
    pub ue_index: DuUeIndex,
    pub direction: LinkDirection,
    /// Number of CCEs of the candidate
    pub aggregation_level: u8,
}

/// PDCCH resource allocator of the cells
pub trait PdcchResourceAllocator {
    /// Reserve CCEs for a DCI sent in `pdcch_slot`
    fn try_reserve(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dci: &DciRequest) -> bool;

    /// Undo the most recent successful reservation in `pdcch_slot`
    fn cancel_last(&mut self, cell_index: DuCellIndex, pdcch_slot: SlotPoint);

    /// Check whether no further DCI of the given direction can be placed in
    /// `pdcch_slot`
    fn is_exhausted(&self, cell_index: DuCellIndex, pdcch_slot: SlotPoint, dir: LinkDirection) -> bool;
}
