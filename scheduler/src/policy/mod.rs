//! Scheduling Policies
//!
//! A policy decides which UEs of a slice are offered to the grid allocator
//! in a slot, and in which order.

mod time_rr;

pub use time_rr::SchedulerTimeRr;

use crate::ue::UeRepository;
use crate::ue_scheduling::{UePdschAllocator, UePuschAllocator};
use common::{DuCellIndex, RanSliceId, SlotPoint};
use std::cell::RefCell;

/// Scope of one policy invocation
#[derive(Debug, Clone, Copy)]
pub struct SliceSchedContext<'a> {
    /// PDCCH slot being scheduled
    pub slot: SlotPoint,
    pub cell_index: DuCellIndex,
    pub slice_id: RanSliceId,
    /// PDCCH to PUSCH delays usable in the cell
    pub k2_candidates: &'a [u8],
}

/// Priority-ordered driver of the grid allocator.
///
/// The repository is shared with the allocator, so a policy must not hold a
/// borrow of it across allocation calls.
pub trait SchedulerPolicy {
    fn dl_sched<A: UePdschAllocator>(&mut self, alloc: &mut A, ues: &RefCell<UeRepository>, ctx: &SliceSchedContext<'_>);

    fn ul_sched<A: UePuschAllocator>(&mut self, alloc: &mut A, ues: &RefCell<UeRepository>, ctx: &SliceSchedContext<'_>);
}
