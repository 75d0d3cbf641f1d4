//! UE grant requests and allocation outcomes

use common::{DuCellIndex, DuUeIndex, HarqId, OfdmSymbolRange};
use std::fmt;

/// What a grant transmits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// New transport block for `nof_bytes` of pending data
    NewTx { nof_bytes: u32 },
    /// Retransmission of a NACKed transport block
    Retx { harq_id: HarqId },
}

/// PDSCH grant request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UePdschGrant {
    pub ue_index: DuUeIndex,
    pub cell_index: DuCellIndex,
    pub kind: GrantKind,
    /// Upper bound on the RBs of the grant
    pub max_nof_rbs: u32,
    /// PDSCH symbols, the cell default when absent
    pub symbols: Option<OfdmSymbolRange>,
}

/// PUSCH grant request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UePuschGrant {
    pub ue_index: DuUeIndex,
    pub cell_index: DuCellIndex,
    pub kind: GrantKind,
    pub max_nof_rbs: u32,
    /// PDCCH to PUSCH delay
    pub k2: u8,
    pub symbols: Option<OfdmSymbolRange>,
}

/// Outcome of a grant allocation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStatus {
    Success,
    /// No CCEs left for the DCI
    NoPdcchSpace,
    /// No PUCCH or PUSCH room for the UCI
    NoUciSpace,
    /// No RBs left in the target slot
    NoGridSpace,
    /// UE, cell or HARQ state does not allow the grant
    InvalidRequest,
}

impl fmt::Display for AllocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocStatus::Success => "success",
            AllocStatus::NoPdcchSpace => "no PDCCH space",
            AllocStatus::NoUciSpace => "no UCI space",
            AllocStatus::NoGridSpace => "no grid space",
            AllocStatus::InvalidRequest => "invalid request",
        };
        write!(f, "{}", s)
    }
}

/// Allocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocResult {
    pub status: AllocStatus,
    /// RBs granted, zero unless successful
    pub alloc_nof_rbs: u32,
}

impl AllocResult {
    pub fn success(alloc_nof_rbs: u32) -> Self {
        Self {
            status: AllocStatus::Success,
            alloc_nof_rbs,
        }
    }

    pub fn failure(status: AllocStatus) -> Self {
        debug_assert_ne!(status, AllocStatus::Success);
        Self {
            status,
            alloc_nof_rbs: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AllocStatus::Success
    }
}
