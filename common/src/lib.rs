//! Common Utilities and Types Library
//! 
//! This crate provides the radio value types shared by the scheduler, its
//! interfaces and the DU process wiring.

pub mod bounded;
pub mod mcs;
pub mod ofdm;
pub mod slot_point;
pub mod types;

// Re-export commonly used items
pub use bounded::*;
pub use mcs::{ModulationScheme, SchMcsDescription};
pub use ofdm::{OfdmSymbolRange, RbInterval, MAX_NOF_PRBS, NOF_OFDM_SYMBOLS_PER_SLOT};
pub use slot_point::SlotPoint;
pub use types::*;
