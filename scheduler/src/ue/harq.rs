//! HARQ Processes
//! 
//! DL and UL HARQ entities of a UE in one cell. A DL process is matched to
//! its HARQ-ACK by (UCI slot, HARQ id); a UL process to its CRC by
//! (PUSCH slot, HARQ id).

use common::{HarqId, OfdmSymbolRange, Rnti, SchMcsIndex, SlotPoint, MAX_NOF_HARQS};
use tracing::{debug, warn};

/// State of a HARQ process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqState {
    /// Available for a new transport block
    Empty,
    /// Transmitted, feedback not yet received
    WaitingAck,
    /// NACKed, waiting for a retransmission opportunity
    PendingRetx,
}

/// Result of applying feedback to a HARQ process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqOutcome {
    Acked,
    /// Retransmission pending
    Nacked,
    /// Maximum number of retransmissions reached, transport block dropped
    Failed,
}

/// Feedback matched to a HARQ process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqFeedback {
    pub harq_id: HarqId,
    /// Slot of the PDSCH/PUSCH the feedback refers to
    pub slot_tx: SlotPoint,
    pub tbs_bytes: u32,
    pub outcome: HarqOutcome,
}

/// One HARQ process
#[derive(Debug, Clone, Copy)]
pub struct HarqProcess {
    id: HarqId,
    state: HarqState,
    slot_tx: SlotPoint,
    slot_ack: SlotPoint,
    nof_rbs: u16,
    symbols: OfdmSymbolRange,
    mcs: SchMcsIndex,
    tbs_bytes: u32,
    nof_retxs: u8,
}

impl HarqProcess {
    fn new(id: HarqId, initial_slot: SlotPoint) -> Self {
        Self {
            id,
            state: HarqState::Empty,
            slot_tx: initial_slot,
            slot_ack: initial_slot,
            nof_rbs: 0,
            symbols: OfdmSymbolRange::default(),
            mcs: SchMcsIndex::new(0),
            tbs_bytes: 0,
            nof_retxs: 0,
        }
    }

    pub fn id(&self) -> HarqId {
        self.id
    }

    pub fn state(&self) -> HarqState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == HarqState::Empty
    }

    pub fn has_pending_retx(&self) -> bool {
        self.state == HarqState::PendingRetx
    }

    /// Slot of the last transmission
    pub fn slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }

    /// Slot where feedback for the last transmission is expected
    pub fn slot_ack(&self) -> SlotPoint {
        self.slot_ack
    }

    pub fn nof_rbs(&self) -> u16 {
        self.nof_rbs
    }

    pub fn symbols(&self) -> OfdmSymbolRange {
        self.symbols
    }

    pub fn mcs(&self) -> SchMcsIndex {
        self.mcs
    }

    pub fn tbs_bytes(&self) -> u32 {
        self.tbs_bytes
    }

    pub fn nof_retxs(&self) -> u8 {
        self.nof_retxs
    }

    fn new_tx(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint, nof_rbs: u16, symbols: OfdmSymbolRange, mcs: SchMcsIndex, tbs_bytes: u32) {
        assert!(self.is_empty(), "New transmission on busy HARQ process {}", self.id);
        self.state = HarqState::WaitingAck;
        self.slot_tx = slot_tx;
        self.slot_ack = slot_ack;
        self.nof_rbs = nof_rbs;
        self.symbols = symbols;
        self.mcs = mcs;
        self.tbs_bytes = tbs_bytes;
        self.nof_retxs = 0;
    }

    fn new_retx(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint) {
        assert!(
            self.has_pending_retx(),
            "Retransmission on HARQ process {} without pending retransmission",
            self.id
        );
        self.state = HarqState::WaitingAck;
        self.slot_tx = slot_tx;
        self.slot_ack = slot_ack;
        self.nof_retxs += 1;
    }

    fn feedback(&mut self, ack: bool, max_nof_retxs: u8) -> HarqFeedback {
        let outcome = if ack {
            HarqOutcome::Acked
        } else if self.nof_retxs < max_nof_retxs {
            HarqOutcome::Nacked
        } else {
            HarqOutcome::Failed
        };
        self.state = match outcome {
            HarqOutcome::Nacked => HarqState::PendingRetx,
            HarqOutcome::Acked | HarqOutcome::Failed => HarqState::Empty,
        };
        HarqFeedback {
            harq_id: self.id,
            slot_tx: self.slot_tx,
            tbs_bytes: self.tbs_bytes,
            outcome,
        }
    }

    fn is_waiting_feedback_at(&self, slot: SlotPoint) -> bool {
        self.state == HarqState::WaitingAck && self.slot_ack == slot
    }

    fn is_feedback_overdue(&self, slot: SlotPoint, timeout_slots: u32) -> bool {
        self.state == HarqState::WaitingAck && slot - self.slot_ack > timeout_slots as i32
    }
}

/// DL and UL HARQ processes of a UE in one cell
#[derive(Debug, Clone)]
pub struct HarqEntity {
    rnti: Rnti,
    dl: [HarqProcess; MAX_NOF_HARQS],
    ul: [HarqProcess; MAX_NOF_HARQS],
    max_nof_retxs: u8,
    feedback_timeout_slots: u32,
}

impl HarqEntity {
    /// Create the entity; `slot` is the slot of creation
    pub fn new(rnti: Rnti, slot: SlotPoint, max_nof_retxs: u8, feedback_timeout_slots: u32) -> Self {
        let procs = std::array::from_fn(|id| HarqProcess::new(HarqId::new(id as u8), slot));
        Self {
            rnti,
            dl: procs,
            ul: procs,
            max_nof_retxs,
            feedback_timeout_slots,
        }
    }

    pub fn dl_harq(&self, id: HarqId) -> &HarqProcess {
        &self.dl[id.as_usize()]
    }

    pub fn ul_harq(&self, id: HarqId) -> &HarqProcess {
        &self.ul[id.as_usize()]
    }

    pub fn find_empty_dl_harq(&self) -> Option<HarqId> {
        self.dl.iter().find(|h| h.is_empty()).map(|h| h.id)
    }

    pub fn find_pending_dl_retx(&self) -> Option<HarqId> {
        self.dl.iter().find(|h| h.has_pending_retx()).map(|h| h.id)
    }

    pub fn find_empty_ul_harq(&self) -> Option<HarqId> {
        self.ul.iter().find(|h| h.is_empty()).map(|h| h.id)
    }

    pub fn find_pending_ul_retx(&self) -> Option<HarqId> {
        self.ul.iter().find(|h| h.has_pending_retx()).map(|h| h.id)
    }

    /// Whether a UL transmission of this entity is scheduled in `pusch_slot`
    pub fn has_ul_tx_at(&self, pusch_slot: SlotPoint) -> bool {
        self.ul.iter().any(|h| h.state == HarqState::WaitingAck && h.slot_tx == pusch_slot)
    }

    /// Number of DL processes waiting for feedback or a retransmission
    pub fn nof_busy_dl_harqs(&self) -> usize {
        self.dl.iter().filter(|h| !h.is_empty()).count()
    }

    /// Start a new DL transport block
    pub fn new_dl_tx(&mut self, id: HarqId, pdsch_slot: SlotPoint, uci_slot: SlotPoint, nof_rbs: u16, symbols: OfdmSymbolRange, mcs: SchMcsIndex, tbs_bytes: u32) {
        self.dl[id.as_usize()].new_tx(pdsch_slot, uci_slot, nof_rbs, symbols, mcs, tbs_bytes);
    }

    pub fn new_dl_retx(&mut self, id: HarqId, pdsch_slot: SlotPoint, uci_slot: SlotPoint) {
        self.dl[id.as_usize()].new_retx(pdsch_slot, uci_slot);
    }

    /// Start a new UL transport block. CRC is expected at the PUSCH slot.
    pub fn new_ul_tx(&mut self, id: HarqId, pusch_slot: SlotPoint, nof_rbs: u16, symbols: OfdmSymbolRange, mcs: SchMcsIndex, tbs_bytes: u32) {
        self.ul[id.as_usize()].new_tx(pusch_slot, pusch_slot, nof_rbs, symbols, mcs, tbs_bytes);
    }

    pub fn new_ul_retx(&mut self, id: HarqId, pusch_slot: SlotPoint) {
        self.ul[id.as_usize()].new_retx(pusch_slot, pusch_slot);
    }

    /// Apply a HARQ-ACK received in `uci_slot`. Returns `None` when no DL
    /// process expects feedback for this HARQ id in that slot.
    pub fn dl_ack_info(&mut self, uci_slot: SlotPoint, id: HarqId, ack: bool) -> Option<HarqFeedback> {
        let max_nof_retxs = self.max_nof_retxs;
        let h = &mut self.dl[id.as_usize()];
        if !h.is_waiting_feedback_at(uci_slot) {
            return None;
        }
        let feedback = h.feedback(ack, max_nof_retxs);
        if feedback.outcome == HarqOutcome::Failed {
            warn!(
                "rnti={} DL HARQ {} discarded after {} retransmissions",
                self.rnti, id, max_nof_retxs
            );
        }
        Some(feedback)
    }

    /// Apply a CRC of the PUSCH received in `pusch_slot`
    pub fn ul_crc_info(&mut self, pusch_slot: SlotPoint, id: HarqId, crc_ok: bool) -> Option<HarqFeedback> {
        let max_nof_retxs = self.max_nof_retxs;
        let h = &mut self.ul[id.as_usize()];
        if !h.is_waiting_feedback_at(pusch_slot) {
            return None;
        }
        let feedback = h.feedback(crc_ok, max_nof_retxs);
        if feedback.outcome == HarqOutcome::Failed {
            warn!(
                "rnti={} UL HARQ {} discarded after {} retransmissions",
                self.rnti, id, max_nof_retxs
            );
        }
        Some(feedback)
    }

    /// Treat overdue feedback as NACK
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        let timeout = self.feedback_timeout_slots;
        let max_nof_retxs = self.max_nof_retxs;
        for (dir, procs) in [("DL", &mut self.dl), ("UL", &mut self.ul)] {
            for h in procs.iter_mut().filter(|h| h.is_feedback_overdue(slot, timeout)) {
                if h.feedback(false, max_nof_retxs).outcome == HarqOutcome::Failed {
                    warn!(
                        "rnti={} {} HARQ {} discarded after feedback timeout at slot {}",
                        self.rnti, dir, h.id, slot
                    );
                } else {
                    debug!("rnti={} {} HARQ {} feedback timeout at slot {}", self.rnti, dir, h.id, slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SubcarrierSpacing;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs30, count)
    }

    fn entity() -> HarqEntity {
        HarqEntity::new(Rnti::new(0x4601), slot(0), 2, 8)
    }

    fn symbols() -> OfdmSymbolRange {
        OfdmSymbolRange::new(2, 14)
    }

    #[test]
    fn test_dl_ack_matches_uci_slot() {
        let mut harqs = entity();
        let id = harqs.find_empty_dl_harq().unwrap();
        harqs.new_dl_tx(id, slot(0), slot(7), 51, symbols(), SchMcsIndex::new(20), 3000);
        assert_ne!(harqs.find_empty_dl_harq(), Some(id));

        // Wrong slot is not matched
        assert_eq!(harqs.dl_ack_info(slot(8), id, true), None);
        let feedback = harqs.dl_ack_info(slot(7), id, true).unwrap();
        assert_eq!(feedback.slot_tx, slot(0));
        assert_eq!(feedback.outcome, HarqOutcome::Acked);
        assert!(harqs.dl_harq(id).is_empty());
        // Duplicate feedback is not matched
        assert_eq!(harqs.dl_ack_info(slot(7), id, true), None);
    }

    #[test]
    fn test_nack_until_max_retxs() {
        let mut harqs = entity();
        let id = HarqId::new(3);
        harqs.new_dl_tx(id, slot(0), slot(7), 10, symbols(), SchMcsIndex::new(20), 500);

        assert_eq!(harqs.dl_ack_info(slot(7), id, false).unwrap().outcome, HarqOutcome::Nacked);
        assert_eq!(harqs.find_pending_dl_retx(), Some(id));
        harqs.new_dl_retx(id, slot(10), slot(17));
        assert_eq!(harqs.dl_harq(id).nof_retxs(), 1);
        assert_eq!(harqs.dl_harq(id).nof_rbs(), 10);

        assert_eq!(harqs.dl_ack_info(slot(17), id, false).unwrap().outcome, HarqOutcome::Nacked);
        harqs.new_dl_retx(id, slot(20), slot(27));
        assert_eq!(harqs.dl_ack_info(slot(27), id, false).unwrap().outcome, HarqOutcome::Failed);
        assert!(harqs.dl_harq(id).is_empty());
    }

    #[test]
    fn test_feedback_timeout_counts_as_nack() {
        let mut harqs = entity();
        let id = HarqId::new(0);
        harqs.new_ul_tx(id, slot(7), 40, OfdmSymbolRange::full_slot(), SchMcsIndex::new(16), 2000);

        harqs.slot_indication(slot(15));
        assert_eq!(harqs.ul_harq(id).state(), HarqState::WaitingAck);
        harqs.slot_indication(slot(16));
        assert_eq!(harqs.ul_harq(id).state(), HarqState::PendingRetx);
        // Late CRC is ignored
        assert_eq!(harqs.ul_crc_info(slot(7), id, true), None);
    }

    #[test]
    fn test_feedback_timeout_after_last_retx_releases_process() {
        let mut harqs = entity();
        let id = HarqId::new(1);
        harqs.new_dl_tx(id, slot(0), slot(4), 10, symbols(), SchMcsIndex::new(20), 500);
        assert_eq!(harqs.dl_ack_info(slot(4), id, false).unwrap().outcome, HarqOutcome::Nacked);
        harqs.new_dl_retx(id, slot(5), slot(9));
        assert_eq!(harqs.dl_ack_info(slot(9), id, false).unwrap().outcome, HarqOutcome::Nacked);
        harqs.new_dl_retx(id, slot(10), slot(14));

        // Last retransmission never acknowledged
        harqs.slot_indication(slot(23));
        assert!(harqs.dl_harq(id).is_empty());
        assert_eq!(harqs.find_pending_dl_retx(), None);
    }

    #[test]
    fn test_ul_tx_slot_lookup() {
        let mut harqs = entity();
        harqs.new_ul_tx(HarqId::new(0), slot(7), 40, OfdmSymbolRange::full_slot(), SchMcsIndex::new(16), 2000);
        // DL processes do not count
        harqs.new_dl_tx(HarqId::new(1), slot(8), slot(12), 10, symbols(), SchMcsIndex::new(20), 500);

        assert!(harqs.has_ul_tx_at(slot(7)));
        assert!(!harqs.has_ul_tx_at(slot(8)));

        harqs.ul_crc_info(slot(7), HarqId::new(0), true).unwrap();
        assert!(!harqs.has_ul_tx_at(slot(7)));
    }

    #[test]
    #[should_panic(expected = "busy HARQ process")]
    fn test_new_tx_on_busy_process_panics() {
        let mut harqs = entity();
        let id = HarqId::new(0);
        harqs.new_dl_tx(id, slot(0), slot(7), 10, symbols(), SchMcsIndex::new(20), 500);
        harqs.new_dl_tx(id, slot(1), slot(8), 10, symbols(), SchMcsIndex::new(20), 500);
    }
}
