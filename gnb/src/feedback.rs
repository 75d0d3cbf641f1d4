//! Emulated UE feedback
//!
//! Turns the scheduling decisions of a slot into the HARQ-ACK and CRC
//! indications the PHY would report for them.

use common::{DuCellIndex, HarqId, SlotPoint, MAX_NOF_HARQS};
use interfaces::{CrcIndication, HarqAckReport, IndicationSender, SchedIndication, UciIndication};
use scheduler::SchedResult;

pub struct FeedbackEmulator {
    nack_period: u32,
    nof_feedbacks: u32,
    nof_dropped: u64,
}

impl FeedbackEmulator {
    pub fn new(nack_period: u32) -> Self {
        Self {
            nack_period,
            nof_feedbacks: 0,
            nof_dropped: 0,
        }
    }

    /// Indications that did not fit in the scheduler queue
    pub fn nof_dropped(&self) -> u64 {
        self.nof_dropped
    }

    /// Report feedback for every PUCCH and PUSCH of `res`
    pub fn on_sched_result(&mut self, res: &SchedResult, slot: SlotPoint, cell_index: DuCellIndex, tx: &IndicationSender) {
        for pucch in res.pucchs.iter() {
            let mut report = HarqAckReport::default();
            for harq_id in pucch.harq_id_iter() {
                let ack = self.next_ack();
                report.push(harq_id, ack);
            }
            if report.is_empty() {
                continue;
            }
            self.push(
                tx,
                SchedIndication::Uci(UciIndication {
                    cell_index,
                    ue_index: pucch.ue_index,
                    crnti: pucch.rnti,
                    slot_rx: slot,
                    harq_ack: report,
                    sr_detected: false,
                }),
            );
        }

        for grant in res.ul_grants.iter() {
            if grant.uci_harq_ids != 0 {
                let mut report = HarqAckReport::default();
                for id in 0..MAX_NOF_HARQS as u8 {
                    if grant.uci_harq_ids & (1u16 << id) != 0 {
                        let ack = self.next_ack();
                        report.push(HarqId::new(id), ack);
                    }
                }
                self.push(
                    tx,
                    SchedIndication::Uci(UciIndication {
                        cell_index,
                        ue_index: grant.ue_index,
                        crnti: grant.rnti,
                        slot_rx: slot,
                        harq_ack: report,
                        sr_detected: false,
                    }),
                );
            }
            let tb_crc_success = self.next_ack();
            self.push(
                tx,
                SchedIndication::Crc(CrcIndication {
                    cell_index,
                    ue_index: grant.ue_index,
                    crnti: grant.rnti,
                    slot_rx: slot,
                    harq_id: grant.harq_id,
                    tb_crc_success,
                }),
            );
        }
    }

    fn next_ack(&mut self) -> bool {
        self.nof_feedbacks = self.nof_feedbacks.wrapping_add(1);
        self.nack_period == 0 || self.nof_feedbacks % self.nack_period != 0
    }

    fn push(&mut self, tx: &IndicationSender, ind: SchedIndication) {
        if tx.try_push(ind).is_err() {
            self.nof_dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        DuUeIndex, OfdmSymbolRange, RanSliceId, RbInterval, Rnti, SchMcsIndex, SubcarrierSpacing,
        UciContent,
    };
    use interfaces::indication_queue;
    use scheduler::{PucchInfo, UlGrantInfo};

    fn slot() -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs15, 7)
    }

    fn pucch(harq_ids: u16) -> PucchInfo {
        PucchInfo {
            ue_index: DuUeIndex::new(0),
            rnti: Rnti::new(0x4601),
            content: UciContent::HARQ_ACK,
            harq_ids,
        }
    }

    fn pusch(harq_id: u8, uci_harq_ids: u16) -> UlGrantInfo {
        UlGrantInfo {
            ue_index: DuUeIndex::new(1),
            rnti: Rnti::new(0x4602),
            slice_id: RanSliceId::new(0),
            harq_id: HarqId::new(harq_id),
            pusch_slot: slot(),
            rbs: RbInterval::new(2, 10),
            symbols: OfdmSymbolRange::full_slot(),
            mcs: SchMcsIndex::new(16),
            tbs_bytes: 500,
            nof_retxs: 0,
            uci_harq_ids,
        }
    }

    #[test]
    fn test_pucch_feedback() {
        let (tx, mut rx) = indication_queue(16);
        let mut res = SchedResult::default();
        res.pucchs.push(pucch(0b101)).unwrap();

        let mut emu = FeedbackEmulator::new(0);
        emu.on_sched_result(&res, slot(), DuCellIndex::new(0), &tx);

        let Some(SchedIndication::Uci(uci)) = rx.try_pop() else {
            panic!("Expected a UCI indication");
        };
        assert_eq!(uci.slot_rx, slot());
        let bits: Vec<_> = uci.harq_ack.iter().collect();
        assert_eq!(bits, vec![(HarqId::new(0), true), (HarqId::new(2), true)]);
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_pusch_feedback_carries_uci_and_crc() {
        let (tx, mut rx) = indication_queue(16);
        let mut res = SchedResult::default();
        res.ul_grants.push(pusch(3, 0b10)).unwrap();

        let mut emu = FeedbackEmulator::new(0);
        emu.on_sched_result(&res, slot(), DuCellIndex::new(0), &tx);

        let Some(SchedIndication::Uci(uci)) = rx.try_pop() else {
            panic!("Expected a UCI indication");
        };
        assert_eq!(uci.ue_index, DuUeIndex::new(1));
        assert_eq!(uci.harq_ack.iter().collect::<Vec<_>>(), vec![(HarqId::new(1), true)]);
        let Some(SchedIndication::Crc(crc)) = rx.try_pop() else {
            panic!("Expected a CRC indication");
        };
        assert_eq!(crc.harq_id, HarqId::new(3));
        assert!(crc.tb_crc_success);
    }

    #[test]
    fn test_nack_period() {
        let (tx, mut rx) = indication_queue(16);
        let mut res = SchedResult::default();
        for id in 0..4 {
            res.ul_grants.push(pusch(id, 0)).unwrap();
        }

        let mut emu = FeedbackEmulator::new(2);
        emu.on_sched_result(&res, slot(), DuCellIndex::new(0), &tx);

        let mut crcs = Vec::new();
        while let Some(SchedIndication::Crc(crc)) = rx.try_pop() {
            crcs.push(crc.tb_crc_success);
        }
        assert_eq!(crcs, vec![true, false, true, false]);
    }

    #[test]
    fn test_full_queue_drops_feedback() {
        let (tx, _rx) = indication_queue(1);
        let mut res = SchedResult::default();
        res.ul_grants.push(pusch(0, 0)).unwrap();
        res.ul_grants.push(pusch(1, 0)).unwrap();

        let mut emu = FeedbackEmulator::new(0);
        emu.on_sched_result(&res, slot(), DuCellIndex::new(0), &tx);
        assert_eq!(emu.nof_dropped(), 1);
    }
}
