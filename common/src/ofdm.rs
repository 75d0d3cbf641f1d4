//! OFDM Symbol and Resource Block Intervals

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Number of OFDM symbols per slot with normal cyclic prefix
pub const NOF_OFDM_SYMBOLS_PER_SLOT: u8 = 14;

/// Range [start, stop) of OFDM symbols within a slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OfdmSymbolRange {
    pub start: u8,
    pub stop: u8,
}

impl OfdmSymbolRange {
    /// Create a new symbol range
    pub fn new(start: u8, stop: u8) -> Self {
        assert!(start <= stop, "Invalid symbol range [{}, {})", start, stop);
        Self { start, stop }
    }

    /// Range covering the whole slot
    pub fn full_slot() -> Self {
        Self::new(0, NOF_OFDM_SYMBOLS_PER_SLOT)
    }

    /// Number of symbols in the range
    pub fn length(&self) -> u8 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Check whether `other` lies fully inside this range
    pub fn contains(&self, other: &OfdmSymbolRange) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }

    pub fn overlaps(&self, other: &OfdmSymbolRange) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Symbol indexes as a `usize` range, for slicing
    pub fn as_range(&self) -> Range<usize> {
        self.start as usize..self.stop as usize
    }
}

impl fmt::Display for OfdmSymbolRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

impl fmt::Debug for OfdmSymbolRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Converts a SLIV into OFDM symbols [S, S+L), 3GPP TS 38.214 Section 5.1.2.1
pub fn sliv_to_ofdm_symbols(sliv: u32) -> OfdmSymbolRange {
    let n = NOF_OFDM_SYMBOLS_PER_SLOT as u32;
    let mut length = sliv / n + 1;
    let mut start = sliv % n;
    if start + length > n {
        length = n - length + 2;
        start = n - 1 - start;
    }
    OfdmSymbolRange::new(start as u8, (start + length) as u8)
}

/// Maximum number of PRBs of a carrier, TS 38.101
pub const MAX_NOF_PRBS: u16 = 275;

/// Range [start, stop) of resource blocks
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RbInterval {
    pub start: u16,
    pub stop: u16,
}

impl RbInterval {
    /// Create a new RB interval
    pub fn new(start: u16, stop: u16) -> Self {
        assert!(start <= stop, "Invalid RB interval [{}, {})", start, stop);
        Self { start, stop }
    }

    /// Number of RBs in the interval
    pub fn length(&self) -> u16 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    pub fn overlaps(&self, other: &RbInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// RB indexes as a `usize` range, for slicing
    pub fn as_range(&self) -> Range<usize> {
        self.start as usize..self.stop as usize
    }
}

impl fmt::Display for RbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

impl fmt::Debug for RbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliv_conversion() {
        // S=0, L=4
        assert_eq!(sliv_to_ofdm_symbols(42), OfdmSymbolRange::new(0, 4));
        // S=2, L=12 uses the long-duration encoding
        assert_eq!(sliv_to_ofdm_symbols(53), OfdmSymbolRange::new(2, 14));
        // S=2, L=10
        assert_eq!(sliv_to_ofdm_symbols(81), OfdmSymbolRange::new(2, 12));
    }

    #[test]
    fn test_interval_overlap() {
        let a = RbInterval::new(0, 10);
        assert!(a.overlaps(&RbInterval::new(9, 12)));
        assert!(!a.overlaps(&RbInterval::new(10, 12)));

        let syms = OfdmSymbolRange::new(2, 14);
        assert!(OfdmSymbolRange::full_slot().contains(&syms));
        assert!(!syms.contains(&OfdmSymbolRange::new(0, 4)));
        assert_eq!(syms.to_string(), "[2, 14)");
    }
}
