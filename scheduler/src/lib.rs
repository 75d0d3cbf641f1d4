//! DU Radio Resource Scheduler Library
//! 
//! This crate implements the per-slot PDSCH/PUSCH grant decision engine of the
//! DU: the cell resource grids, the PDCCH and UCI allocators, the UE
//! repository and the allocator that places a single UE grant atomically
//! across all of them.

pub mod cell;
pub mod config;
pub mod pdcch;
pub mod policy;
pub mod result;
pub mod slicing;
pub mod uci;
pub mod ue;
pub mod ue_scheduling;

pub use config::{CellConfiguration, CellParams, SchedulerExpertConfig};
pub use result::{DlGrantInfo, PdcchInfo, PucchInfo, SchedResult, UlGrantInfo};
pub use ue_scheduling::{AllocResult, AllocStatus, UeCellGridAllocator, UeScheduler};

use common::RanSliceId;
use thiserror::Error;

/// Maximum delay between PDCCH and PDSCH, in slots
pub const SCHEDULER_MAX_K0: usize = 15;
/// Maximum delay between PDSCH and its HARQ-ACK, in slots
pub const SCHEDULER_MAX_K1: usize = 15;
/// Maximum delay between PDCCH and PUSCH, in slots
pub const SCHEDULER_MAX_K2: usize = 15;
/// Number of slots tracked by the resource grid and UCI rings. Divides the
/// SFN cycle of every numerology.
pub const RING_ALLOCATOR_SIZE: usize = 40;
/// Number of slots tracked by the PDCCH ring
pub const PDCCH_RING_SIZE: usize = 4;

/// Maximum PDSCH grants per slot and cell
pub const MAX_PDSCHS_PER_SLOT: usize = 16;
/// Maximum PUSCH grants per slot and cell
pub const MAX_PUSCHS_PER_SLOT: usize = 16;
/// Maximum PUCCH transmissions per slot and cell
pub const MAX_PUCCHS_PER_SLOT: usize = 32;
/// Maximum DL DCIs per slot and cell
pub const MAX_DL_PDCCHS_PER_SLOT: usize = 16;
/// Maximum UL DCIs per slot and cell
pub const MAX_UL_PDCCHS_PER_SLOT: usize = 16;
/// Maximum number of K1 candidates
pub const MAX_K1_CANDIDATES: usize = 16;
/// Maximum number of K2 candidates per cell
pub const MAX_K2_CANDIDATES: usize = 4;
/// Maximum number of serving cells per UE
pub const MAX_CELLS_PER_UE: usize = 4;

/// Scheduler configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    
    #[error("{param}={value} exceeds the scheduler lookahead bound {max}")]
    LookaheadExceeded {
        param: &'static str,
        value: u32,
        max: u32,
    },
    
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
    
    #[error("Unknown RAN slice {0}")]
    UnknownSlice(RanSliceId),
    
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
