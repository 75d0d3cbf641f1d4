//! Slot Ring
//! 
//! Fixed-size window of per-slot state, indexed by slot count. Slots leaving
//! the window are recycled for the slots entering it.

use common::slot_point::NOF_SFNS;
use common::SlotPoint;

/// Slot counts per SFN cycle at 15 kHz. The ring size must divide it so that
/// indexing stays continuous across the SFN wrap-around of every numerology.
const MIN_SLOT_MODULUS: usize = NOF_SFNS as usize * 10;

#[derive(Debug, Clone)]
struct RingEntry<T> {
    slot: Option<SlotPoint>,
    value: T,
}

/// Window of `size` consecutive slots starting at the current slot
#[derive(Debug, Clone)]
pub struct SlotRing<T> {
    entries: Vec<RingEntry<T>>,
    current: Option<SlotPoint>,
}

impl<T: Default> SlotRing<T> {
    /// Create a ring; all memory is allocated here
    pub fn new(size: usize) -> Self {
        assert!(
            size > 0 && MIN_SLOT_MODULUS % size == 0,
            "Slot ring size {} must divide {}",
            size,
            MIN_SLOT_MODULUS
        );
        let entries = (0..size)
            .map(|_| RingEntry {
                slot: None,
                value: T::default(),
            })
            .collect();
        Self { entries, current: None }
    }
}

impl<T> SlotRing<T> {
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// First slot of the window
    pub fn current(&self) -> Option<SlotPoint> {
        self.current
    }

    /// Move the window start to `slot`. `on_enter` is called with the ring
    /// index and entry of every slot entering the window, which must reset it.
    pub fn slot_indication(&mut self, slot: SlotPoint, mut on_enter: impl FnMut(SlotPoint, usize, &mut T)) {
        let size = self.entries.len();
        let nof_new = match self.current {
            Some(current) => {
                let diff = slot - current;
                if diff == 0 {
                    return;
                }
                assert!(diff > 0, "Slot {} is older than the ring window start {}", slot, current);
                (diff as usize).min(size)
            }
            None => size,
        };
        self.current = Some(slot);

        // The last `nof_new` slots of the new window are the fresh ones.
        let first_new = slot + (size - nof_new) as u32;
        for i in 0..nof_new {
            let sl = first_new + i as u32;
            let idx = Self::ring_index(sl, size);
            let entry = &mut self.entries[idx];
            entry.slot = Some(sl);
            on_enter(sl, idx, &mut entry.value);
        }
    }

    fn ring_index(slot: SlotPoint, size: usize) -> usize {
        slot.count() as usize % size
    }

    /// Check whether a slot is inside the current window
    pub fn contains(&self, slot: SlotPoint) -> bool {
        match self.current {
            Some(current) => {
                let diff = slot - current;
                diff >= 0 && (diff as usize) < self.entries.len()
            }
            None => false,
        }
    }

    /// Ring index of a slot inside the window
    pub fn index_of(&self, slot: SlotPoint) -> usize {
        assert!(
            self.contains(slot),
            "Slot {} outside of the ring window starting at {:?}",
            slot,
            self.current
        );
        Self::ring_index(slot, self.entries.len())
    }

    pub fn get(&self, slot: SlotPoint) -> &T {
        let idx = self.index_of(slot);
        &self.entries[idx].value
    }

    pub fn get_mut(&mut self, slot: SlotPoint) -> &mut T {
        let idx = self.index_of(slot);
        &mut self.entries[idx].value
    }
}
