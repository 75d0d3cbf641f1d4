//! RAN Slicing
//! 
//! Per-slot RB budgets of the RAN slices of a cell.

mod ran_slice_candidate;
mod slice_scheduler;

pub use ran_slice_candidate::{
    Dl, DlRanSliceCandidate, LinkDirectionMarker, RanSliceCandidate, Ul, UlRanSliceCandidate,
};
pub use slice_scheduler::{RanSliceConfig, SliceScheduler};
