//! UE Event Manager
//!
//! Drains the indication queue at the start of a slot and applies the
//! indications to the UE repository.

use crate::ue::{HarqConfig, HarqOutcome, Ue, UeRepository};
use common::{DuCellIndex, DuUeIndex, SlotPoint};
use interfaces::{
    indication_queue, CrcIndication, IndicationReceiver, IndicationSender, SchedIndication,
    UciIndication, UeCreationRequest,
};
use tracing::{debug, warn};

/// Counters of the indications processed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub dl_acks: u64,
    pub dl_nacks: u64,
    pub ul_crc_ok: u64,
    pub ul_crc_ko: u64,
    /// Feedback for which no HARQ process was waiting
    pub unmatched_feedback: u64,
    /// Indications for UEs, cells or RNTIs that do not exist
    pub unknown_ue: u64,
}

pub struct UeEventManager {
    tx: IndicationSender,
    rx: IndicationReceiver,
    max_indications_per_slot: usize,
    harq_cfg: HarqConfig,
    stats: EventStats,
}

impl UeEventManager {
    pub fn new(queue_size: usize, max_indications_per_slot: usize, harq_cfg: HarqConfig) -> Self {
        let (tx, rx) = indication_queue(queue_size);
        Self {
            tx,
            rx,
            max_indications_per_slot,
            harq_cfg,
            stats: EventStats::default(),
        }
    }

    /// Handle for producers in other execution contexts
    pub fn indication_sender(&self) -> IndicationSender {
        self.tx.clone()
    }

    pub fn stats(&self) -> &EventStats {
        &self.stats
    }

    pub fn nof_pending(&self) -> usize {
        self.rx.len()
    }

    /// Apply up to the per-slot limit of queued indications. The rest stay
    /// queued for the next slot.
    pub fn run(&mut self, slot: SlotPoint, ues: &mut UeRepository, is_cell_active: impl Fn(DuCellIndex) -> bool) {
        let mut nof_processed = 0;
        while nof_processed < self.max_indications_per_slot {
            let Some(ind) = self.rx.try_pop() else {
                break;
            };
            nof_processed += 1;
            match ind {
                SchedIndication::UeCreation(req) => self.handle_ue_creation(slot, ues, &req, &is_cell_active),
                SchedIndication::UeRemoval(ue_index) => {
                    if ues.remove_ue(ue_index).is_none() {
                        warn!("Removal of unknown ue={}", ue_index);
                        self.stats.unknown_ue += 1;
                    }
                }
                SchedIndication::DlBufferState(ind) => match ues.get_mut(ind.ue_index) {
                    Some(ue) => ue.handle_dl_buffer_state(ind.lcid, ind.bs),
                    None => self.discard(ind.ue_index, "DL buffer state"),
                },
                SchedIndication::UlBsr(ind) => match ues.get_mut(ind.ue_index) {
                    Some(ue) if ue.crnti() == ind.crnti => ue.handle_bsr(ind.lcg_id, ind.nof_bytes),
                    _ => self.discard(ind.ue_index, "BSR"),
                },
                SchedIndication::Uci(ind) => self.handle_uci(ues, &ind),
                SchedIndication::Crc(ind) => self.handle_crc(ues, &ind),
            }
        }
        if nof_processed > 0 {
            debug!(
                "Slot {}: processed {} indications, {} left queued",
                slot,
                nof_processed,
                self.rx.len()
            );
        }
    }

    fn discard(&mut self, ue_index: DuUeIndex, what: &str) {
        warn!("Discarding {} for unknown ue={}", what, ue_index);
        self.stats.unknown_ue += 1;
    }

    fn handle_ue_creation(
        &mut self,
        slot: SlotPoint,
        ues: &mut UeRepository,
        req: &UeCreationRequest,
        is_cell_active: &impl Fn(DuCellIndex) -> bool,
    ) {
        if !is_cell_active(req.pcell_index) {
            warn!("ue={} creation failed: cell {} is not active", req.ue_index, req.pcell_index);
            return;
        }
        let ue = Ue::new(req.ue_index, req.crnti, req.pcell_index, req.slice_id, slot, self.harq_cfg);
        if let Err(e) = ues.add_ue(ue) {
            warn!("ue={} creation failed: {}", req.ue_index, e);
        }
    }

    fn handle_uci(&mut self, ues: &mut UeRepository, ind: &UciIndication) {
        let Some(ue) = ues.get_mut(ind.ue_index).filter(|ue| ue.crnti() == ind.crnti) else {
            self.discard(ind.ue_index, "UCI");
            return;
        };
        if ind.sr_detected {
            debug!("ue={} SR detected at slot {}", ind.ue_index, ind.slot_rx);
            ue.handle_sr();
        }
        let Some(cell) = ue.find_cell_mut(ind.cell_index) else {
            self.discard(ind.ue_index, "UCI of unconfigured cell");
            return;
        };
        for (harq_id, ack) in ind.harq_ack.iter() {
            match cell.harqs.dl_ack_info(ind.slot_rx, harq_id, ack) {
                Some(feedback) => {
                    debug!(
                        "ue={} DL HARQ {} {:?}, PDSCH slot {}",
                        ind.ue_index, harq_id, feedback.outcome, feedback.slot_tx
                    );
                    match feedback.outcome {
                        HarqOutcome::Acked => self.stats.dl_acks += 1,
                        HarqOutcome::Nacked | HarqOutcome::Failed => self.stats.dl_nacks += 1,
                    }
                }
                None => {
                    warn!(
                        "ue={} HARQ-ACK for DL HARQ {} at slot {} matches no transmission",
                        ind.ue_index, harq_id, ind.slot_rx
                    );
                    self.stats.unmatched_feedback += 1;
                }
            }
        }
    }

    fn handle_crc(&mut self, ues: &mut UeRepository, ind: &CrcIndication) {
        let cell = ues
            .get_mut(ind.ue_index)
            .filter(|ue| ue.crnti() == ind.crnti)
            .and_then(|ue| ue.find_cell_mut(ind.cell_index));
        let Some(cell) = cell else {
            self.discard(ind.ue_index, "CRC");
            return;
        };
        match cell.harqs.ul_crc_info(ind.slot_rx, ind.harq_id, ind.tb_crc_success) {
            Some(feedback) if feedback.outcome == HarqOutcome::Acked => self.stats.ul_crc_ok += 1,
            Some(_) => self.stats.ul_crc_ko += 1,
            None => {
                warn!(
                    "ue={} CRC for UL HARQ {} at slot {} matches no transmission",
                    ind.ue_index, ind.harq_id, ind.slot_rx
                );
                self.stats.unmatched_feedback += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerExpertConfig;
    use interfaces::{DlBufferStateIndication, HarqAckReport, UlBsrIndication};
    use common::{
        DuUeIndex, HarqId, LcgId, Lcid, OfdmSymbolRange, RanSliceId, Rnti, SchMcsIndex,
        SubcarrierSpacing,
    };

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs30, count)
    }

    fn manager() -> UeEventManager {
        let expert = SchedulerExpertConfig::default();
        UeEventManager::new(16, 8, HarqConfig::from(&expert))
    }

    fn creation(idx: u16) -> SchedIndication {
        SchedIndication::UeCreation(UeCreationRequest {
            ue_index: DuUeIndex::new(idx),
            crnti: Rnti::new(0x4601 + idx),
            pcell_index: DuCellIndex::new(0),
            slice_id: RanSliceId::new(0),
        })
    }

    fn cell0(cell: DuCellIndex) -> bool {
        cell == DuCellIndex::new(0)
    }

    #[test]
    fn test_creation_and_buffer_updates() {
        let mut mng = manager();
        let mut ues = UeRepository::new(4);
        let tx = mng.indication_sender();
        tx.try_push(creation(0)).unwrap();
        tx.try_push(SchedIndication::DlBufferState(DlBufferStateIndication {
            ue_index: DuUeIndex::new(0),
            lcid: Lcid::new(4),
            bs: 1200,
        }))
        .unwrap();
        tx.try_push(SchedIndication::UlBsr(UlBsrIndication {
            cell_index: DuCellIndex::new(0),
            ue_index: DuUeIndex::new(0),
            crnti: Rnti::new(0x4601),
            lcg_id: LcgId::new(0),
            nof_bytes: 300,
        }))
        .unwrap();
        mng.run(slot(0), &mut ues, cell0);

        let ue = ues.get(DuUeIndex::new(0)).unwrap();
        assert_eq!(ue.pending_dl_newtx_bytes(), 1200);
        assert_eq!(ue.pending_ul_newtx_bytes(), 300);
        assert_eq!(mng.stats(), &EventStats::default());
    }

    #[test]
    fn test_unknown_ue_and_inactive_cell() {
        let mut mng = manager();
        let mut ues = UeRepository::new(4);
        let tx = mng.indication_sender();
        tx.try_push(SchedIndication::UeCreation(UeCreationRequest {
            ue_index: DuUeIndex::new(1),
            crnti: Rnti::new(0x4602),
            pcell_index: DuCellIndex::new(3),
            slice_id: RanSliceId::new(0),
        }))
        .unwrap();
        tx.try_push(SchedIndication::UeRemoval(DuUeIndex::new(2))).unwrap();
        tx.try_push(SchedIndication::DlBufferState(DlBufferStateIndication {
            ue_index: DuUeIndex::new(1),
            lcid: Lcid::new(4),
            bs: 10,
        }))
        .unwrap();
        mng.run(slot(0), &mut ues, cell0);

        assert!(ues.is_empty());
        assert_eq!(mng.stats().unknown_ue, 2);
    }

    #[test]
    fn test_harq_ack_matched_by_uci_slot() {
        let mut mng = manager();
        let mut ues = UeRepository::new(4);
        mng.indication_sender().try_push(creation(0)).unwrap();
        mng.run(slot(0), &mut ues, cell0);

        let (h0, h1) = (HarqId::new(0), HarqId::new(1));
        {
            let harqs = &mut ues.get_mut(DuUeIndex::new(0)).unwrap().find_cell_mut(DuCellIndex::new(0)).unwrap().harqs;
            let symbols = OfdmSymbolRange::new(2, 14);
            harqs.new_dl_tx(h0, slot(1), slot(5), 10, symbols, SchMcsIndex::new(20), 500);
            harqs.new_dl_tx(h1, slot(2), slot(6), 10, symbols, SchMcsIndex::new(20), 500);
        }

        let mut report = HarqAckReport::default();
        report.push(h0, true);
        report.push(h1, false);
        mng.indication_sender()
            .try_push(SchedIndication::Uci(UciIndication {
                cell_index: DuCellIndex::new(0),
                ue_index: DuUeIndex::new(0),
                crnti: Rnti::new(0x4601),
                slot_rx: slot(5),
                harq_ack: report,
                sr_detected: true,
            }))
            .unwrap();
        mng.run(slot(6), &mut ues, cell0);

        // HARQ 1 expects its feedback at slot 6
        assert_eq!(mng.stats().dl_acks, 1);
        assert_eq!(mng.stats().unmatched_feedback, 1);
        let ue = ues.get(DuUeIndex::new(0)).unwrap();
        assert!(ue.sr_pending());
        let harqs = &ue.find_cell(DuCellIndex::new(0)).unwrap().harqs;
        assert!(harqs.dl_harq(h0).is_empty());
        assert!(!harqs.dl_harq(h1).is_empty());
    }

    #[test]
    fn test_crc_feedback() {
        let mut mng = manager();
        let mut ues = UeRepository::new(4);
        mng.indication_sender().try_push(creation(0)).unwrap();
        mng.run(slot(0), &mut ues, cell0);
        let h = HarqId::new(3);
        ues.get_mut(DuUeIndex::new(0))
            .unwrap()
            .find_cell_mut(DuCellIndex::new(0))
            .unwrap()
            .harqs
            .new_ul_tx(h, slot(4), 8, OfdmSymbolRange::new(0, 14), SchMcsIndex::new(16), 300);

        let crc = |ok: bool, rnti: u16| {
            SchedIndication::Crc(CrcIndication {
                cell_index: DuCellIndex::new(0),
                ue_index: DuUeIndex::new(0),
                crnti: Rnti::new(rnti),
                slot_rx: slot(4),
                harq_id: h,
                tb_crc_success: ok,
            })
        };
        let tx = mng.indication_sender();
        tx.try_push(crc(true, 0x9999)).unwrap();
        tx.try_push(crc(false, 0x4601)).unwrap();
        mng.run(slot(5), &mut ues, cell0);

        assert_eq!(mng.stats().unknown_ue, 1);
        assert_eq!(mng.stats().ul_crc_ko, 1);
        let harqs = &ues.get(DuUeIndex::new(0)).unwrap().find_cell(DuCellIndex::new(0)).unwrap().harqs;
        assert_eq!(harqs.find_pending_ul_retx(), Some(h));
    }

    #[test]
    fn test_per_slot_limit_keeps_remaining_queued() {
        let expert = SchedulerExpertConfig::default();
        let mut mng = UeEventManager::new(16, 2, HarqConfig::from(&expert));
        let mut ues = UeRepository::new(8);
        let tx = mng.indication_sender();
        for i in 0..5 {
            tx.try_push(creation(i)).unwrap();
        }
        mng.run(slot(0), &mut ues, cell0);
        assert_eq!(ues.len(), 2);
        assert_eq!(mng.nof_pending(), 3);
        mng.run(slot(1), &mut ues, cell0);
        mng.run(slot(2), &mut ues, cell0);
        assert_eq!(ues.len(), 5);
        assert_eq!(mng.nof_pending(), 0);
    }
}
