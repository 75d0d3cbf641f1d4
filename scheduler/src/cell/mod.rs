//! Cell Resources
//! 
//! Time-frequency bookkeeping of one cell: TDD pattern, slot ring and the
//! per-slot DL/UL resource grids.

pub mod resource_grid;
pub mod slot_ring;
pub mod tdd;

pub use resource_grid::{CellResourceAllocator, SlotGrants};
pub use slot_ring::SlotRing;
pub use tdd::{SymbolType, TddPattern};
