//! Message Types for Scheduler Indications
//! 
//! Defines the records handed to the scheduling context once per slot

use common::{DuCellIndex, DuUeIndex, HarqId, LcgId, Lcid, RanSliceId, Rnti, SlotPoint};
use serde::{Deserialize, Serialize};

/// Request to create a UE in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UeCreationRequest {
    /// DU-local UE index
    pub ue_index: DuUeIndex,
    /// C-RNTI
    pub crnti: Rnti,
    /// Primary serving cell
    pub pcell_index: DuCellIndex,
    /// RAN slice the UE's DRBs belong to
    pub slice_id: RanSliceId,
}

/// DL buffer occupancy of one logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlBufferStateIndication {
    pub ue_index: DuUeIndex,
    pub lcid: Lcid,
    /// Pending bytes in the RLC entity
    pub bs: u32,
}

/// Short BSR for one logical channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlBsrIndication {
    pub cell_index: DuCellIndex,
    pub ue_index: DuUeIndex,
    pub crnti: Rnti,
    pub lcg_id: LcgId,
    /// Reported buffer size in bytes
    pub nof_bytes: u32,
}

/// HARQ-ACK bits decoded from one UCI occasion, indexed by HARQ process id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HarqAckReport {
    /// Bitmap of HARQ ids reported in this UCI
    pub reported: u16,
    /// Bitmap of HARQ ids acknowledged (subset of `reported`)
    pub acked: u16,
}

impl HarqAckReport {
    /// Add the feedback of one HARQ process
    pub fn push(&mut self, harq_id: HarqId, ack: bool) {
        let bit = 1u16 << harq_id.value();
        self.reported |= bit;
        if ack {
            self.acked |= bit;
        } else {
            self.acked &= !bit;
        }
    }

    /// Iterate over the reported (HARQ id, ACK) pairs
    pub fn iter(&self) -> impl Iterator<Item = (HarqId, bool)> + '_ {
        (0..16u8)
            .filter(move |id| self.reported & (1 << id) != 0)
            .map(move |id| (HarqId::new(id), self.acked & (1 << id) != 0))
    }

    pub fn is_empty(&self) -> bool {
        self.reported == 0
    }
}

/// UCI decoded at a given slot for one UE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UciIndication {
    pub cell_index: DuCellIndex,
    pub ue_index: DuUeIndex,
    pub crnti: Rnti,
    /// Slot in which the UCI was received
    pub slot_rx: SlotPoint,
    /// HARQ-ACK feedback
    pub harq_ack: HarqAckReport,
    /// Scheduling request detected
    pub sr_detected: bool,
}

/// PUSCH CRC result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcIndication {
    pub cell_index: DuCellIndex,
    pub ue_index: DuUeIndex,
    pub crnti: Rnti,
    /// Slot in which the PUSCH was received
    pub slot_rx: SlotPoint,
    pub harq_id: HarqId,
    pub tb_crc_success: bool,
}

/// Input handed to the scheduling execution context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SchedIndication {
    /// UE creation
    UeCreation(UeCreationRequest),
    /// UE removal
    UeRemoval(DuUeIndex),
    /// DL buffer state update
    DlBufferState(DlBufferStateIndication),
    /// UL buffer status report
    UlBsr(UlBsrIndication),
    /// UCI (HARQ-ACK, SR)
    Uci(UciIndication),
    /// PUSCH CRC
    Crc(CrcIndication),
}

impl SchedIndication {
    /// UE the indication refers to
    pub fn ue_index(&self) -> DuUeIndex {
        match self {
            SchedIndication::UeCreation(req) => req.ue_index,
            SchedIndication::UeRemoval(ue_index) => *ue_index,
            SchedIndication::DlBufferState(ind) => ind.ue_index,
            SchedIndication::UlBsr(ind) => ind.ue_index,
            SchedIndication::Uci(ind) => ind.ue_index,
            SchedIndication::Crc(ind) => ind.ue_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SubcarrierSpacing;
    
    #[test]
    fn test_message_serialization() {
        let mut harq_ack = HarqAckReport::default();
        harq_ack.push(HarqId::new(3), true);
        harq_ack.push(HarqId::new(5), false);

        let ind = SchedIndication::Uci(UciIndication {
            cell_index: DuCellIndex::new(0),
            ue_index: DuUeIndex::new(7),
            crnti: Rnti::new(0x4601),
            slot_rx: SlotPoint::new(SubcarrierSpacing::Scs30, 12, 7),
            harq_ack,
            sr_detected: false,
        });
        
        // Serialize
        let serialized = serde_json::to_string(&ind).unwrap();
        
        // Deserialize
        let deserialized: SchedIndication = serde_json::from_str(&serialized).unwrap();
        
        assert_eq!(ind, deserialized);
        assert_eq!(deserialized.ue_index(), DuUeIndex::new(7));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let json = r#"{"ue_index":5000,"lcid":4,"bs":100}"#;
        assert!(serde_json::from_str::<DlBufferStateIndication>(json).is_err());
    }

    #[test]
    fn test_harq_ack_report() {
        let mut report = HarqAckReport::default();
        assert!(report.is_empty());
        report.push(HarqId::new(0), true);
        report.push(HarqId::new(2), false);
        let bits: Vec<_> = report.iter().collect();
        assert_eq!(bits, vec![(HarqId::new(0), true), (HarqId::new(2), false)]);
    }
}
