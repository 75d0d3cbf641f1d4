//! Round-robin time-domain policy

use super::{SchedulerPolicy, SliceSchedContext};
use crate::config::SchedulerExpertConfig;
use crate::ue::{HarqEntity, UeRepository};
use crate::ue_scheduling::{
    AllocStatus, GrantKind, UePdschAllocator, UePdschGrant, UePuschAllocator, UePuschGrant,
};
use common::DuUeIndex;
use std::cell::RefCell;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct UeCandidate {
    ue_index: DuUeIndex,
    kind: GrantKind,
    /// RBs of the original transmission, for retransmissions
    retx_nof_rbs: u32,
    /// Positions in the K2 list whose PUSCH slot already carries a grant of the UE
    blocked_k2: u8,
}

/// Serves retransmissions first, then new transmissions, starting from a
/// different UE every slot
#[derive(Debug, Clone)]
pub struct SchedulerTimeRr {
    sr_grant_bytes: u32,
    next_dl_ue: usize,
    next_ul_ue: usize,
    /// Reused across slots
    candidates: Vec<UeCandidate>,
}

impl SchedulerTimeRr {
    pub fn new(expert_cfg: &SchedulerExpertConfig) -> Self {
        Self {
            sr_grant_bytes: expert_cfg.sr_grant_bytes,
            next_dl_ue: 0,
            next_ul_ue: 0,
            candidates: Vec::with_capacity(expert_cfg.max_nof_ues),
        }
    }

    fn collect_dl_candidates(&mut self, ues: &UeRepository, ctx: &SliceSchedContext<'_>) {
        self.candidates.clear();
        let start = self.next_dl_ue;
        let slice_ues = || {
            ues.iter_from(start)
                .filter(|ue| ue.slice_id() == ctx.slice_id)
                .filter_map(|ue| ue.find_cell(ctx.cell_index).map(|cell| (ue, cell)))
        };
        for (ue, cell) in slice_ues() {
            if let Some(harq_id) = cell.harqs.find_pending_dl_retx() {
                self.candidates.push(UeCandidate {
                    ue_index: ue.ue_index(),
                    kind: GrantKind::Retx { harq_id },
                    retx_nof_rbs: cell.harqs.dl_harq(harq_id).nof_rbs() as u32,
                    blocked_k2: 0,
                });
            }
        }
        // A UE with a pending retransmission gets no new transmission in the same slot
        for (ue, cell) in slice_ues().filter(|(_, cell)| cell.harqs.find_pending_dl_retx().is_none()) {
            let nof_bytes = ue.pending_dl_newtx_bytes();
            if nof_bytes > 0 && cell.harqs.find_empty_dl_harq().is_some() {
                self.candidates.push(UeCandidate {
                    ue_index: ue.ue_index(),
                    kind: GrantKind::NewTx { nof_bytes },
                    retx_nof_rbs: 0,
                    blocked_k2: 0,
                });
            }
        }
    }

    fn collect_ul_candidates(&mut self, ues: &UeRepository, ctx: &SliceSchedContext<'_>) {
        self.candidates.clear();
        let start = self.next_ul_ue;
        let sr_grant_bytes = self.sr_grant_bytes;
        let slice_ues = || {
            ues.iter_from(start)
                .filter(|ue| ue.slice_id() == ctx.slice_id)
                .filter_map(|ue| ue.find_cell(ctx.cell_index).map(|cell| (ue, cell)))
        };
        let blocked_k2 = |harqs: &HarqEntity| {
            ctx.k2_candidates
                .iter()
                .enumerate()
                .filter(|&(_, &k2)| harqs.has_ul_tx_at(ctx.slot + u32::from(k2)))
                .fold(0u8, |mask, (pos, _)| mask | (1 << pos))
        };
        for (ue, cell) in slice_ues() {
            if let Some(harq_id) = cell.harqs.find_pending_ul_retx() {
                self.candidates.push(UeCandidate {
                    ue_index: ue.ue_index(),
                    kind: GrantKind::Retx { harq_id },
                    retx_nof_rbs: cell.harqs.ul_harq(harq_id).nof_rbs() as u32,
                    blocked_k2: blocked_k2(&cell.harqs),
                });
            }
        }
        for (ue, cell) in slice_ues().filter(|(_, cell)| cell.harqs.find_pending_ul_retx().is_none()) {
            let mut nof_bytes = ue.pending_ul_newtx_bytes();
            if nof_bytes == 0 && ue.sr_pending() {
                nof_bytes = sr_grant_bytes;
            }
            if nof_bytes > 0 && cell.harqs.find_empty_ul_harq().is_some() {
                self.candidates.push(UeCandidate {
                    ue_index: ue.ue_index(),
                    kind: GrantKind::NewTx { nof_bytes },
                    retx_nof_rbs: 0,
                    blocked_k2: blocked_k2(&cell.harqs),
                });
            }
        }
    }

    /// RB limit for a candidate, `None` when the budget cannot fit it
    fn max_nof_rbs(candidate: &UeCandidate, remaining_rbs: u32) -> Option<u32> {
        match candidate.kind {
            GrantKind::Retx { .. } if candidate.retx_nof_rbs > remaining_rbs => None,
            GrantKind::Retx { .. } => Some(candidate.retx_nof_rbs),
            GrantKind::NewTx { .. } => Some(remaining_rbs),
        }
    }
}

impl SchedulerPolicy for SchedulerTimeRr {
    fn dl_sched<A: UePdschAllocator>(&mut self, alloc: &mut A, ues: &RefCell<UeRepository>, ctx: &SliceSchedContext<'_>) {
        {
            let ues = ues.borrow();
            self.collect_dl_candidates(&ues, ctx);
        }

        let mut first_served = None;
        for candidate in &self.candidates {
            let remaining = alloc.remaining_rbs();
            if remaining == 0 {
                break;
            }
            let Some(max_nof_rbs) = Self::max_nof_rbs(candidate, remaining) else {
                continue;
            };
            let grant = UePdschGrant {
                ue_index: candidate.ue_index,
                cell_index: ctx.cell_index,
                kind: candidate.kind,
                max_nof_rbs,
                symbols: None,
            };
            let result = alloc.allocate_dl_grant(&grant);
            match result.status {
                AllocStatus::Success => {
                    first_served.get_or_insert(candidate.ue_index);
                }
                AllocStatus::NoPdcchSpace => {
                    trace!("slice={} DL stopped: {}", ctx.slice_id, result.status);
                    break;
                }
                _ => {}
            }
        }

        if let Some(ue_index) = first_served {
            self.next_dl_ue = ue_index.as_usize() + 1;
        }
    }

    fn ul_sched<A: UePuschAllocator>(&mut self, alloc: &mut A, ues: &RefCell<UeRepository>, ctx: &SliceSchedContext<'_>) {
        {
            let ues = ues.borrow();
            self.collect_ul_candidates(&ues, ctx);
        }

        let mut first_served = None;
        'ues: for candidate in &self.candidates {
            for (pos, &k2) in ctx.k2_candidates.iter().enumerate() {
                if candidate.blocked_k2 & (1 << pos) != 0 {
                    continue;
                }
                let remaining = alloc.remaining_rbs();
                if remaining == 0 {
                    break 'ues;
                }
                let Some(max_nof_rbs) = Self::max_nof_rbs(candidate, remaining) else {
                    continue 'ues;
                };
                let grant = UePuschGrant {
                    ue_index: candidate.ue_index,
                    cell_index: ctx.cell_index,
                    kind: candidate.kind,
                    max_nof_rbs,
                    k2,
                    symbols: None,
                };
                let result = alloc.allocate_ul_grant(&grant);
                match result.status {
                    AllocStatus::Success => {
                        first_served.get_or_insert(candidate.ue_index);
                        continue 'ues;
                    }
                    // Every K2 shares the PDCCH slot
                    AllocStatus::NoPdcchSpace => {
                        trace!("slice={} UL stopped: {}", ctx.slice_id, result.status);
                        break 'ues;
                    }
                    _ => {}
                }
            }
        }

        if let Some(ue_index) = first_served {
            self.next_ul_ue = ue_index.as_usize() + 1;
        }
    }
}
