//! PUCCH and PUSCH UCI bookkeeping of one cell

use super::{UciAllocator, UciKind};
use crate::cell::SlotRing;
use crate::config::{CellParams, SchedulerExpertConfig};
use crate::result::PucchInfo;
use crate::{MAX_PUCCHS_PER_SLOT, MAX_PUSCHS_PER_SLOT, RING_ALLOCATOR_SIZE};
use common::{DuCellIndex, DuUeIndex, Rnti, SlotPoint, UciContent};
use heapless::{Deque, Vec};
use tracing::trace;

const MAX_UCI_UES_PER_SLOT: usize = MAX_PUCCHS_PER_SLOT + MAX_PUSCHS_PER_SLOT;
const UNDO_DEPTH: usize = 4;

/// UCI of one UE in one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UciEntry {
    pub ue_index: DuUeIndex,
    pub rnti: Rnti,
    pub content: UciContent,
    /// Acknowledged DL HARQ processes, one bit per HARQ id
    pub harq_ids: u16,
    /// Carried on PUSCH instead of PUCCH
    pub on_pusch: bool,
}

#[derive(Debug, Clone, Copy)]
enum UndoRecord {
    Added { nof_pucchs: usize },
    Modified { pos: usize, prev: UciEntry, nof_pucchs: usize },
}

#[derive(Debug, Clone, Default)]
struct UciSlot {
    ues: Vec<UciEntry, MAX_UCI_UES_PER_SLOT>,
    nof_pucchs: usize,
    undo: Deque<UndoRecord, UNDO_DEPTH>,
}

impl UciSlot {
    fn clear(&mut self) {
        self.ues.clear();
        self.nof_pucchs = 0;
        self.undo.clear();
    }

    fn find(&self, ue_index: DuUeIndex) -> Option<usize> {
        self.ues.iter().position(|e| e.ue_index == ue_index)
    }

    fn record(&mut self, record: UndoRecord) {
        if self.undo.is_full() {
            self.undo.pop_front();
        }
        // Cannot fail after making room.
        let _ = self.undo.push_back(record);
    }
}

/// Observable UCI state of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciSlotSnapshot {
    pub nof_pucchs: usize,
    pub entries: Vec<UciEntry, MAX_UCI_UES_PER_SLOT>,
}

/// UCI allocator of one cell
#[derive(Debug, Clone)]
pub struct UciAllocatorImpl {
    params: CellParams,
    max_pucchs_per_slot: usize,
    max_harq_bits: u32,
    slots: SlotRing<UciSlot>,
}

impl UciAllocatorImpl {
    pub fn new(params: CellParams, expert_cfg: &SchedulerExpertConfig) -> Self {
        Self {
            params,
            max_pucchs_per_slot: expert_cfg.max_pucchs_per_slot,
            max_harq_bits: expert_cfg.max_harq_bits_per_uci as u32,
            slots: SlotRing::new(RING_ALLOCATOR_SIZE),
        }
    }

    pub fn slot_indication(&mut self, slot: SlotPoint) {
        self.slots.slot_indication(slot, |_, _, entry| entry.clear());
    }

    /// PUCCH transmissions of a slot
    pub fn pucchs(&self, slot: SlotPoint) -> impl Iterator<Item = PucchInfo> + '_ {
        self.slots
            .get(slot)
            .ues
            .iter()
            .filter(|e| !e.on_pusch && !e.content.is_empty())
            .map(|e| PucchInfo {
                ue_index: e.ue_index,
                rnti: e.rnti,
                content: e.content,
                harq_ids: e.harq_ids,
            })
    }

    /// HARQ-ACK bits multiplexed on the PUSCH of a UE
    pub fn pusch_harq_ids(&self, slot: SlotPoint, ue_index: DuUeIndex) -> u16 {
        self.slots
            .get(slot)
            .ues
            .iter()
            .find(|e| e.ue_index == ue_index && e.on_pusch)
            .map_or(0, |e| e.harq_ids)
    }

    pub fn snapshot(&self, slot: SlotPoint) -> UciSlotSnapshot {
        let entry = self.slots.get(slot);
        UciSlotSnapshot {
            nof_pucchs: entry.nof_pucchs,
            entries: entry.ues.clone(),
        }
    }

    fn reserve_harq_ack(&mut self, uci_slot: SlotPoint, ue_index: DuUeIndex, rnti: Rnti, harq_bit: u16) -> bool {
        if !self.params.has_pucch_room(uci_slot) {
            return false;
        }
        let max_pucchs = self.max_pucchs_per_slot;
        let max_bits = self.max_harq_bits;
        let slot = self.slots.get_mut(uci_slot);
        match slot.find(ue_index) {
            Some(pos) => {
                let prev = slot.ues[pos];
                if prev.harq_ids & harq_bit != 0 || prev.harq_ids.count_ones() >= max_bits {
                    return false;
                }
                slot.ues[pos].harq_ids |= harq_bit;
                slot.ues[pos].content |= UciContent::HARQ_ACK;
                let nof_pucchs = slot.nof_pucchs;
                slot.record(UndoRecord::Modified { pos, prev, nof_pucchs });
            }
            None => {
                if slot.nof_pucchs >= max_pucchs {
                    return false;
                }
                let entry = UciEntry {
                    ue_index,
                    rnti,
                    content: UciContent::HARQ_ACK,
                    harq_ids: harq_bit,
                    on_pusch: false,
                };
                if slot.ues.push(entry).is_err() {
                    return false;
                }
                let nof_pucchs = slot.nof_pucchs;
                slot.nof_pucchs += 1;
                slot.record(UndoRecord::Added { nof_pucchs });
            }
        }
        true
    }

    fn reserve_pusch_multiplexing(&mut self, uci_slot: SlotPoint, ue_index: DuUeIndex, rnti: Rnti) -> bool {
        let slot = self.slots.get_mut(uci_slot);
        match slot.find(ue_index) {
            Some(pos) => {
                let prev = slot.ues[pos];
                let nof_pucchs = slot.nof_pucchs;
                if !prev.on_pusch {
                    slot.ues[pos].on_pusch = true;
                    slot.nof_pucchs -= 1;
                }
                slot.record(UndoRecord::Modified { pos, prev, nof_pucchs });
            }
            None => {
                let entry = UciEntry {
                    ue_index,
                    rnti,
                    content: UciContent::empty(),
                    harq_ids: 0,
                    on_pusch: true,
                };
                if slot.ues.push(entry).is_err() {
                    return false;
                }
                let nof_pucchs = slot.nof_pucchs;
                slot.record(UndoRecord::Added { nof_pucchs });
            }
        }
        true
    }
}

impl UciAllocator for UciAllocatorImpl {
    fn try_reserve(
        &mut self,
        cell_index: DuCellIndex,
        uci_slot: SlotPoint,
        ue_index: DuUeIndex,
        rnti: Rnti,
        kind: UciKind,
    ) -> bool {
        debug_assert_eq!(cell_index, self.params.cell_index);
        let ok = match kind {
            UciKind::HarqAck { harq_id } => self.reserve_harq_ack(uci_slot, ue_index, rnti, 1 << harq_id.value()),
            UciKind::PuschMultiplexing => self.reserve_pusch_multiplexing(uci_slot, ue_index, rnti),
        };
        if ok {
            trace!("UCI {:?} for rnti={} reserved at slot {}", kind, rnti, uci_slot);
        }
        ok
    }

    fn cancel_last(&mut self, cell_index: DuCellIndex, uci_slot: SlotPoint) {
        debug_assert_eq!(cell_index, self.params.cell_index);
        let slot = self.slots.get_mut(uci_slot);
        match slot.undo.pop_back() {
            Some(UndoRecord::Added { nof_pucchs }) => {
                slot.ues.pop();
                slot.nof_pucchs = nof_pucchs;
            }
            Some(UndoRecord::Modified { pos, prev, nof_pucchs }) => {
                slot.ues[pos] = prev;
                slot.nof_pucchs = nof_pucchs;
            }
            None => {}
        }
    }
}
