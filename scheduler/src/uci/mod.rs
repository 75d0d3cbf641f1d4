//! UCI Allocation
//! 
//! Placement of uplink control information (HARQ-ACK feedback) on PUCCH, or
//! multiplexed on the UE's PUSCH when one is granted in the same slot.

mod uci_allocator;

pub use uci_allocator::{UciAllocatorImpl, UciEntry, UciSlotSnapshot};

use common::{DuCellIndex, DuUeIndex, HarqId, Rnti, SlotPoint};

/// UCI to be reserved for a UE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UciKind {
    /// HARQ-ACK bit of a PDSCH
    HarqAck { harq_id: HarqId },
    /// PUSCH granted in the UCI slot; pending UCI moves onto it
    PuschMultiplexing,
}

/// UCI allocator of the cells
pub trait UciAllocator {
    /// Reserve UCI resources for a UE in `uci_slot`
    fn try_reserve(
        &mut self,
        cell_index: DuCellIndex,
        uci_slot: SlotPoint,
        ue_index: DuUeIndex,
        rnti: Rnti,
        kind: UciKind,
    ) -> bool;

    /// Undo the most recent successful reservation in `uci_slot`
    fn cancel_last(&mut self, cell_index: DuCellIndex, uci_slot: SlotPoint);
}
