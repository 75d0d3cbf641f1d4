//! TDD Pattern
//! 
//! DL/UL slot pattern according to 3GPP TS 38.213 Section 11.1
//! (tdd-UL-DL-ConfigurationCommon, single pattern).

use crate::SchedError;
use common::{SlotPoint, SubcarrierSpacing, NOF_OFDM_SYMBOLS_PER_SLOT};
use common::slot_point::NOF_SFNS;
use serde::{Deserialize, Serialize};

/// Symbol type in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    /// Downlink symbol
    Downlink,
    /// Uplink symbol
    Uplink,
    /// Flexible or guard symbol, usable by neither direction
    Flexible,
}

/// TDD UL/DL pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddPattern {
    /// Pattern periodicity in slots
    pub period_slots: u32,
    /// Number of full DL slots at the start of the period
    pub nof_dl_slots: u32,
    /// DL symbols of the slot following the last full DL slot
    pub nof_dl_symbols: u8,
    /// Number of full UL slots at the end of the period
    pub nof_ul_slots: u32,
    /// UL symbols of the slot preceding the first full UL slot
    pub nof_ul_symbols: u8,
}

impl TddPattern {
    pub fn new(period_slots: u32, nof_dl_slots: u32, nof_dl_symbols: u8, nof_ul_slots: u32, nof_ul_symbols: u8) -> Self {
        Self {
            period_slots,
            nof_dl_slots,
            nof_dl_symbols,
            nof_ul_slots,
            nof_ul_symbols,
        }
    }

    /// Validate the pattern for the given numerology
    pub fn validate(&self, scs: SubcarrierSpacing) -> Result<(), SchedError> {
        let invalid = |reason: &str| {
            Err(SchedError::InvalidConfiguration(format!("TDD pattern {:?}: {}", self, reason)))
        };
        if self.period_slots == 0 {
            return invalid("empty period");
        }
        if (scs.slots_per_frame() * NOF_SFNS) % self.period_slots != 0 {
            return invalid("period does not divide the SFN cycle");
        }
        if self.nof_dl_slots + self.nof_ul_slots > self.period_slots {
            return invalid("more DL and UL slots than the period");
        }
        if self.nof_dl_symbols >= NOF_OFDM_SYMBOLS_PER_SLOT || self.nof_ul_symbols >= NOF_OFDM_SYMBOLS_PER_SLOT {
            return invalid("partial slot symbols must not fill the slot");
        }
        let nof_flexible = self.period_slots - self.nof_dl_slots - self.nof_ul_slots;
        if nof_flexible == 0 && (self.nof_dl_symbols > 0 || self.nof_ul_symbols > 0) {
            return invalid("no flexible slot for partial symbols");
        }
        if nof_flexible == 1 && self.nof_dl_symbols + self.nof_ul_symbols > NOF_OFDM_SYMBOLS_PER_SLOT {
            return invalid("special slot DL and UL symbols overlap");
        }
        Ok(())
    }

    fn slot_in_period(&self, slot: SlotPoint) -> u32 {
        slot.count() % self.period_slots
    }

    /// Number of DL symbols in a slot, counted from the first symbol
    pub fn nof_dl_symbols(&self, slot: SlotPoint) -> u8 {
        let idx = self.slot_in_period(slot);
        if idx < self.nof_dl_slots {
            NOF_OFDM_SYMBOLS_PER_SLOT
        } else if idx == self.nof_dl_slots {
            self.nof_dl_symbols
        } else {
            0
        }
    }

    /// Number of UL symbols in a slot, counted back from the last symbol
    pub fn nof_ul_symbols(&self, slot: SlotPoint) -> u8 {
        let idx = self.slot_in_period(slot);
        let first_ul_slot = self.period_slots - self.nof_ul_slots;
        if idx >= first_ul_slot {
            NOF_OFDM_SYMBOLS_PER_SLOT
        } else if idx + 1 == first_ul_slot {
            self.nof_ul_symbols
        } else {
            0
        }
    }

    /// Get the type of a symbol
    pub fn symbol_type(&self, slot: SlotPoint, symbol: u8) -> SymbolType {
        if symbol < self.nof_dl_symbols(slot) {
            SymbolType::Downlink
        } else if symbol >= NOF_OFDM_SYMBOLS_PER_SLOT - self.nof_ul_symbols(slot) {
            SymbolType::Uplink
        } else {
            SymbolType::Flexible
        }
    }
}
