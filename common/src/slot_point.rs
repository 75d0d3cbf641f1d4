//! Slot Point
//!
//! Absolute slot counter within the SFN cycle of a given numerology. All
//! arithmetic wraps at `1024 * slots_per_frame`, and comparisons are
//! wrap-aware over half of that window.

use crate::types::SubcarrierSpacing;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of system frame numbers in one SFN cycle
pub const NOF_SFNS: u32 = 1024;

/// One scheduling opportunity in a numerology
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotPoint {
    numerology: u8,
    count: u32,
}

impl SlotPoint {
    /// Create a slot point from SFN and slot index
    pub fn new(scs: SubcarrierSpacing, sfn: u32, slot_index: u32) -> Self {
        assert!(sfn < NOF_SFNS, "Invalid SFN={}", sfn);
        assert!(
            slot_index < scs.slots_per_frame(),
            "Invalid slot index={} for {:?}",
            slot_index,
            scs
        );
        Self {
            numerology: scs.numerology(),
            count: sfn * scs.slots_per_frame() + slot_index,
        }
    }

    /// Create a slot point from an absolute slot count, wrapped into the SFN cycle
    pub fn from_count(scs: SubcarrierSpacing, count: u32) -> Self {
        let modulus = NOF_SFNS * scs.slots_per_frame();
        Self {
            numerology: scs.numerology(),
            count: count % modulus,
        }
    }

    /// Numerology of this slot point
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Subcarrier spacing of this slot point
    pub fn scs(&self) -> SubcarrierSpacing {
        // The numerology is only ever built from a valid SubcarrierSpacing.
        SubcarrierSpacing::from_numerology(self.numerology).unwrap_or(SubcarrierSpacing::Scs15)
    }

    /// Number of slots per frame
    pub fn nof_slots_per_frame(&self) -> u32 {
        10 << self.numerology
    }

    /// Number of distinct slot points in the SFN cycle
    pub fn modulus(&self) -> u32 {
        NOF_SFNS * self.nof_slots_per_frame()
    }

    /// System frame number
    pub fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    /// Slot index within the frame
    pub fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// Absolute count within the SFN cycle
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        let modulus = self.modulus();
        SlotPoint {
            numerology: self.numerology,
            count: ((self.count as u64 + rhs as u64) % modulus as u64) as u32,
        }
    }
}

impl AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> SlotPoint {
        let modulus = self.modulus();
        let rhs = rhs % modulus;
        SlotPoint {
            numerology: self.numerology,
            count: (self.count + modulus - rhs) % modulus,
        }
    }
}

impl Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    /// Signed shortest distance from `rhs` to `self`
    fn sub(self, rhs: SlotPoint) -> i32 {
        debug_assert_eq!(self.numerology, rhs.numerology, "Comparing slots of different numerologies");
        let modulus = self.modulus() as i64;
        let mut diff = (self.count as i64 - rhs.count as i64).rem_euclid(modulus);
        if diff >= modulus / 2 {
            diff -= modulus;
        }
        diff as i32
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.numerology != other.numerology {
            return None;
        }
        Some((*self - *other).cmp(&0))
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

impl fmt::Debug for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotPoint({}, mu={})", self, self.numerology)
    }
}
