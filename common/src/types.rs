//! Common Types for the 5G DU Scheduler
//! 
//! Defines fundamental radio types used throughout the scheduler

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// First C-RNTI value
    pub const MIN_CRNTI: u16 = 0x0001;
    /// Last C-RNTI value
    pub const MAX_CRNTI: u16 = 0xFFEF;

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }
    
    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Check whether the RNTI lies in the C-RNTI range
    pub fn is_crnti(&self) -> bool {
        (Self::MIN_CRNTI..=Self::MAX_CRNTI).contains(&self.0)
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Get the numerology index (mu)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Build from a numerology index
    pub fn from_numerology(mu: u8) -> Option<Self> {
        match mu {
            0 => Some(SubcarrierSpacing::Scs15),
            1 => Some(SubcarrierSpacing::Scs30),
            2 => Some(SubcarrierSpacing::Scs60),
            3 => Some(SubcarrierSpacing::Scs120),
            4 => Some(SubcarrierSpacing::Scs240),
            _ => None,
        }
    }

    /// Number of slots per subframe (1ms)
    pub fn slots_per_subframe(&self) -> u32 {
        1 << self.numerology()
    }

    /// Number of slots per frame (10ms)
    pub fn slots_per_frame(&self) -> u32 {
        10 * self.slots_per_subframe()
    }

    /// Slot duration in microseconds
    pub fn slot_duration_us(&self) -> u32 {
        match self {
            SubcarrierSpacing::Scs15 => 1000,
            SubcarrierSpacing::Scs30 => 500,
            SubcarrierSpacing::Scs60 => 250,
            SubcarrierSpacing::Scs120 => 125,
            SubcarrierSpacing::Scs240 => 62, // Actually 62.5 us
        }
    }
}

/// Channel bandwidth values in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bandwidth {
    /// 5 MHz
    Bw5,
    /// 10 MHz
    Bw10,
    /// 15 MHz
    Bw15,
    /// 20 MHz
    Bw20,
    /// 25 MHz
    Bw25,
    /// 30 MHz
    Bw30,
    /// 40 MHz
    Bw40,
    /// 50 MHz
    Bw50,
    /// 60 MHz
    Bw60,
    /// 80 MHz
    Bw80,
    /// 100 MHz
    Bw100,
}

impl Bandwidth {
    /// Build from a channel bandwidth in MHz
    pub fn from_mhz(mhz: u32) -> Option<Self> {
        let bw = match mhz {
            5 => Bandwidth::Bw5,
            10 => Bandwidth::Bw10,
            15 => Bandwidth::Bw15,
            20 => Bandwidth::Bw20,
            25 => Bandwidth::Bw25,
            30 => Bandwidth::Bw30,
            40 => Bandwidth::Bw40,
            50 => Bandwidth::Bw50,
            60 => Bandwidth::Bw60,
            80 => Bandwidth::Bw80,
            100 => Bandwidth::Bw100,
            _ => return None,
        };
        Some(bw)
    }

    /// Get bandwidth in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            Bandwidth::Bw5 => 5_000_000,
            Bandwidth::Bw10 => 10_000_000,
            Bandwidth::Bw15 => 15_000_000,
            Bandwidth::Bw20 => 20_000_000,
            Bandwidth::Bw25 => 25_000_000,
            Bandwidth::Bw30 => 30_000_000,
            Bandwidth::Bw40 => 40_000_000,
            Bandwidth::Bw50 => 50_000_000,
            Bandwidth::Bw60 => 60_000_000,
            Bandwidth::Bw80 => 80_000_000,
            Bandwidth::Bw100 => 100_000_000,
        }
    }

    /// Maximum transmission bandwidth in RBs, 3GPP TS 38.104 Table 5.3.2-1
    pub fn nof_rbs(&self, scs: SubcarrierSpacing) -> Option<u16> {
        let nof_rbs = match (self, scs) {
            (Bandwidth::Bw5, SubcarrierSpacing::Scs15) => 25,
            (Bandwidth::Bw5, SubcarrierSpacing::Scs30) => 11,
            (Bandwidth::Bw10, SubcarrierSpacing::Scs15) => 52,
            (Bandwidth::Bw10, SubcarrierSpacing::Scs30) => 24,
            (Bandwidth::Bw10, SubcarrierSpacing::Scs60) => 11,
            (Bandwidth::Bw15, SubcarrierSpacing::Scs15) => 79,
            (Bandwidth::Bw15, SubcarrierSpacing::Scs30) => 38,
            (Bandwidth::Bw15, SubcarrierSpacing::Scs60) => 18,
            (Bandwidth::Bw20, SubcarrierSpacing::Scs15) => 106,
            (Bandwidth::Bw20, SubcarrierSpacing::Scs30) => 51,
            (Bandwidth::Bw20, SubcarrierSpacing::Scs60) => 24,
            (Bandwidth::Bw25, SubcarrierSpacing::Scs15) => 133,
            (Bandwidth::Bw25, SubcarrierSpacing::Scs30) => 65,
            (Bandwidth::Bw25, SubcarrierSpacing::Scs60) => 31,
            (Bandwidth::Bw30, SubcarrierSpacing::Scs15) => 160,
            (Bandwidth::Bw30, SubcarrierSpacing::Scs30) => 78,
            (Bandwidth::Bw30, SubcarrierSpacing::Scs60) => 38,
            (Bandwidth::Bw40, SubcarrierSpacing::Scs15) => 216,
            (Bandwidth::Bw40, SubcarrierSpacing::Scs30) => 106,
            (Bandwidth::Bw40, SubcarrierSpacing::Scs60) => 51,
            (Bandwidth::Bw50, SubcarrierSpacing::Scs15) => 270,
            (Bandwidth::Bw50, SubcarrierSpacing::Scs30) => 133,
            (Bandwidth::Bw50, SubcarrierSpacing::Scs60) => 65,
            (Bandwidth::Bw50, SubcarrierSpacing::Scs120) => 32,
            (Bandwidth::Bw60, SubcarrierSpacing::Scs30) => 162,
            (Bandwidth::Bw60, SubcarrierSpacing::Scs60) => 79,
            (Bandwidth::Bw80, SubcarrierSpacing::Scs30) => 217,
            (Bandwidth::Bw80, SubcarrierSpacing::Scs60) => 107,
            (Bandwidth::Bw100, SubcarrierSpacing::Scs30) => 273,
            (Bandwidth::Bw100, SubcarrierSpacing::Scs60) => 135,
            (Bandwidth::Bw100, SubcarrierSpacing::Scs120) => 66,
            _ => return None,
        };
        Some(nof_rbs)
    }
}

/// Transmission direction of a shared channel grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkDirection {
    /// Downlink (PDSCH)
    Downlink,
    /// Uplink (PUSCH)
    Uplink,
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Downlink => write!(f, "DL"),
            LinkDirection::Uplink => write!(f, "UL"),
        }
    }
}

/// S-NSSAI (Single Network Slice Selection Assistance Information)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SNssai {
    /// Slice/Service Type
    pub sst: u8,
    /// Slice Differentiator (optional)
    pub sd: Option<u32>,
}

bitflags! {
    /// Content carried by one UCI occasion
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct UciContent: u8 {
        /// HARQ-ACK feedback bits
        const HARQ_ACK = 0b001;
        /// Scheduling request
        const SR = 0b010;
        /// Channel state information report
        const CSI = 0b100;
    }
}
