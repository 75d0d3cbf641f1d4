//! CORESET Configuration

use crate::SchedError;

/// Resource element groups per CCE (6 REGs of one RB and symbol each)
pub const NOF_RES_PER_CCE: u32 = 6;

/// CORESET configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoresetConfig {
    /// Number of resource blocks
    pub num_rbs: u32,
    /// Number of symbols
    pub num_symbols: u32,
    /// RB offset from point A
    pub rb_offset: u32,
}

impl CoresetConfig {
    /// Get CORESET configuration from table index
    /// Based on 3GPP TS 38.213 Table 13-1 for {15, 15} kHz SCS
    pub fn from_index(index: u8) -> Result<Self, SchedError> {
        let config = match index {
            0 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 0 },
            1 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 2 },
            2 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 4 },
            3 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 0 },
            4 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 2 },
            5 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 4 },
            6 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 12 },
            7 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 16 },
            8 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 12 },
            9 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 16 },
            10 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 12 },
            11 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 16 },
            12 => Self { num_rbs: 96, num_symbols: 1, rb_offset: 38 },
            13 => Self { num_rbs: 96, num_symbols: 2, rb_offset: 38 },
            14 => Self { num_rbs: 96, num_symbols: 3, rb_offset: 38 },
            _ => return Err(SchedError::InvalidConfiguration(
                format!("Invalid CORESET index: {}", index)
            )),
        };
        Ok(config)
    }

    /// Number of CCEs in the CORESET
    pub fn nof_cces(&self) -> u32 {
        self.num_rbs * self.num_symbols / NOF_RES_PER_CCE
    }
}
