//! Shared Channel MCS Tables
//!
//! MCS descriptions from 3GPP TS 38.214 Section 5.1.3.1 and a transport block
//! size estimate used to translate pending bytes into resource blocks.

use crate::bounded::SchMcsIndex;
use crate::ofdm::NOF_OFDM_SYMBOLS_PER_SLOT;
use serde::{Deserialize, Serialize};

/// Subcarriers per resource block
pub const NOF_SUBCARRIERS_PER_RB: u32 = 12;

/// Upper bound of REs per PRB considered for TBS, TS 38.214 Section 5.1.3.2
const MAX_NOF_RE_PER_PRB: u32 = 156;

/// Modulation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModulationScheme {
    Qpsk,
    Qam16,
    Qam64,
    Qam256,
}

impl ModulationScheme {
    /// Bits carried per modulation symbol (Qm)
    pub fn bits_per_symbol(&self) -> u32 {
        match self {
            ModulationScheme::Qpsk => 2,
            ModulationScheme::Qam16 => 4,
            ModulationScheme::Qam64 => 6,
            ModulationScheme::Qam256 => 8,
        }
    }
}

/// One row of an MCS table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchMcsDescription {
    /// Subcarrier modulation scheme
    pub modulation: ModulationScheme,
    /// Target code rate, expressed as R x 1024
    pub target_code_rate: f32,
}

impl SchMcsDescription {
    /// Target spectral efficiency in bits per resource element
    pub fn spectral_efficiency(&self) -> f32 {
        self.modulation.bits_per_symbol() as f32 * self.target_code_rate / 1024.0
    }
}

/// 64QAM MCS table, TS 38.214 Table 5.1.3.1-1. Indexes 29-31 are reserved
/// for retransmissions and carry no code rate.
const QAM64_TABLE: [(ModulationScheme, f32); 29] = [
    (ModulationScheme::Qpsk, 120.0),
    (ModulationScheme::Qpsk, 157.0),
    (ModulationScheme::Qpsk, 193.0),
    (ModulationScheme::Qpsk, 251.0),
    (ModulationScheme::Qpsk, 308.0),
    (ModulationScheme::Qpsk, 379.0),
    (ModulationScheme::Qpsk, 449.0),
    (ModulationScheme::Qpsk, 526.0),
    (ModulationScheme::Qpsk, 602.0),
    (ModulationScheme::Qpsk, 679.0),
    (ModulationScheme::Qam16, 340.0),
    (ModulationScheme::Qam16, 378.0),
    (ModulationScheme::Qam16, 434.0),
    (ModulationScheme::Qam16, 490.0),
    (ModulationScheme::Qam16, 553.0),
    (ModulationScheme::Qam16, 616.0),
    (ModulationScheme::Qam16, 658.0),
    (ModulationScheme::Qam64, 438.0),
    (ModulationScheme::Qam64, 466.0),
    (ModulationScheme::Qam64, 517.0),
    (ModulationScheme::Qam64, 567.0),
    (ModulationScheme::Qam64, 616.0),
    (ModulationScheme::Qam64, 666.0),
    (ModulationScheme::Qam64, 719.0),
    (ModulationScheme::Qam64, 772.0),
    (ModulationScheme::Qam64, 822.0),
    (ModulationScheme::Qam64, 873.0),
    (ModulationScheme::Qam64, 910.0),
    (ModulationScheme::Qam64, 948.0),
];

/// Look up an MCS in the 64QAM table
pub fn mcs_description_qam64(mcs: SchMcsIndex) -> Option<SchMcsDescription> {
    QAM64_TABLE
        .get(mcs.as_usize())
        .map(|&(modulation, target_code_rate)| SchMcsDescription {
            modulation,
            target_code_rate,
        })
}

/// Number of data REs per PRB for a shared channel allocation
pub fn nof_re_per_prb(nof_symbols: u8, nof_dmrs_symbols: u8) -> u32 {
    debug_assert!(nof_symbols <= NOF_OFDM_SYMBOLS_PER_SLOT);
    let data_symbols = nof_symbols.saturating_sub(nof_dmrs_symbols) as u32;
    (data_symbols * NOF_SUBCARRIERS_PER_RB).min(MAX_NOF_RE_PER_PRB)
}

/// Estimated transport block size in bytes for a single-layer allocation
pub fn tbs_bytes(mcs: &SchMcsDescription, nof_re_per_prb: u32, nof_prbs: u32) -> u32 {
    let nof_info_bits = nof_re_per_prb as f32 * nof_prbs as f32 * mcs.spectral_efficiency();
    (nof_info_bits / 8.0) as u32
}

/// Smallest number of PRBs whose TBS covers `nof_bytes`, capped at `max_prbs`
pub fn nof_prbs_for_bytes(mcs: &SchMcsDescription, nof_re_per_prb: u32, nof_bytes: u32, max_prbs: u32) -> u32 {
    let bytes_per_prb = nof_re_per_prb as f32 * mcs.spectral_efficiency() / 8.0;
    if bytes_per_prb <= 0.0 {
        return max_prbs;
    }
    let needed = (nof_bytes as f32 / bytes_per_prb).ceil() as u32;
    needed.clamp(1, max_prbs.max(1))
}
