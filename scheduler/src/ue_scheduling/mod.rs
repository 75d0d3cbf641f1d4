//! UE Scheduling
//!
//! Placement of UE PDSCH/PUSCH grants and the per-slot driver around it.

pub mod event_manager;
pub mod grant;
pub mod slice_allocators;
pub mod ue_cell_grid_allocator;
pub mod ue_scheduler;

#[cfg(test)]
mod test_utils;

pub use event_manager::{EventStats, UeEventManager};
pub use grant::{AllocResult, AllocStatus, GrantKind, UePdschGrant, UePuschGrant};
pub use slice_allocators::{
    DlSliceUeCellGridAllocator, UePdschAllocator, UePuschAllocator, UlSliceUeCellGridAllocator,
};
pub use ue_cell_grid_allocator::{
    SharedPdcchAllocator, SharedResourceGrid, SharedUciAllocator, SharedUeRepository,
    UeCellGridAllocator,
};
pub use ue_scheduler::UeScheduler;
