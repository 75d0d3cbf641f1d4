//! Slice-scoped views of the UE cell grid allocator

use super::grant::{AllocResult, UePdschGrant, UePuschGrant};
use super::ue_cell_grid_allocator::UeCellGridAllocator;
use crate::slicing::{DlRanSliceCandidate, UlRanSliceCandidate};

/// PDSCH grant placement as seen by a scheduling policy
pub trait UePdschAllocator {
    fn allocate_dl_grant(&mut self, grant: &UePdschGrant) -> AllocResult;

    /// RBs the policy may still hand out in this slot
    fn remaining_rbs(&self) -> u32;
}

/// PUSCH grant placement as seen by a scheduling policy
pub trait UePuschAllocator {
    fn allocate_ul_grant(&mut self, grant: &UePuschGrant) -> AllocResult;

    fn remaining_rbs(&self) -> u32;
}

/// Grid allocator bound to the DL candidate of one slice
pub struct DlSliceUeCellGridAllocator<'a> {
    alloc: &'a mut UeCellGridAllocator,
    slice: &'a mut DlRanSliceCandidate,
}

impl<'a> DlSliceUeCellGridAllocator<'a> {
    pub fn new(alloc: &'a mut UeCellGridAllocator, slice: &'a mut DlRanSliceCandidate) -> Self {
        Self { alloc, slice }
    }

    pub fn slice(&self) -> &DlRanSliceCandidate {
        self.slice
    }
}

impl UePdschAllocator for DlSliceUeCellGridAllocator<'_> {
    /// The caller checks the remaining budget first
    fn allocate_dl_grant(&mut self, grant: &UePdschGrant) -> AllocResult {
        let result = self.alloc.allocate_dl_grant(grant, self.slice.id());
        if result.is_success() {
            self.slice.store_grant(result.alloc_nof_rbs);
        }
        result
    }

    fn remaining_rbs(&self) -> u32 {
        self.slice.remaining_rbs()
    }
}

/// Grid allocator bound to the UL candidate of one slice
pub struct UlSliceUeCellGridAllocator<'a> {
    alloc: &'a mut UeCellGridAllocator,
    slice: &'a mut UlRanSliceCandidate,
}

impl<'a> UlSliceUeCellGridAllocator<'a> {
    pub fn new(alloc: &'a mut UeCellGridAllocator, slice: &'a mut UlRanSliceCandidate) -> Self {
        Self { alloc, slice }
    }

    pub fn slice(&self) -> &UlRanSliceCandidate {
        self.slice
    }
}

impl UePuschAllocator for UlSliceUeCellGridAllocator<'_> {
    fn allocate_ul_grant(&mut self, grant: &UePuschGrant) -> AllocResult {
        let result = self.alloc.allocate_ul_grant(grant, self.slice.id());
        if result.is_success() {
            self.slice.store_grant(result.alloc_nof_rbs);
        }
        result
    }

    fn remaining_rbs(&self) -> u32 {
        self.slice.remaining_rbs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerExpertConfig;
    use crate::ue_scheduling::grant::AllocStatus;
    use crate::ue_scheduling::test_utils::{fdd_cell, GridTestBench};
    use common::{DuUeIndex, RanSliceId};

    #[test]
    fn test_dl_adapter_counts_only_successful_grants() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ue0 = bench.add_ue(0);
        bench.set_dl_bytes(ue0, 10_000_000);
        let mut candidate = DlRanSliceCandidate::new(RanSliceId::new(0), bench.slot, 20);

        let full = bench.dl_grant(ue0, 10_000_000);
        let unknown = bench.dl_grant(DuUeIndex::new(9), 100);
        let mut alloc = DlSliceUeCellGridAllocator::new(&mut bench.alloc, &mut candidate);

        assert_eq!(alloc.allocate_dl_grant(&unknown).status, AllocStatus::InvalidRequest);
        assert_eq!(alloc.remaining_rbs(), 20);

        let mut grant = full;
        grant.max_nof_rbs = alloc.remaining_rbs();
        let result = alloc.allocate_dl_grant(&grant);
        assert_eq!(result.alloc_nof_rbs, 20);
        assert_eq!(alloc.remaining_rbs(), 0);
        assert_eq!(alloc.slice().consumed_rbs(), 20);
    }

    #[test]
    fn test_slice_budget_conserved_across_ues() {
        let mut bench = GridTestBench::new(SchedulerExpertConfig::default(), fdd_cell());
        let ues: Vec<DuUeIndex> = (0..6).map(|i| bench.add_ue(i)).collect();
        for &ue in &ues {
            bench.set_ul_bytes(ue, 3000);
        }
        let budget = 30;
        let mut candidate = UlRanSliceCandidate::new(RanSliceId::new(0), bench.slot, budget);
        let grants: Vec<_> = ues.iter().map(|&ue| bench.ul_grant(ue, 3000, 4)).collect();

        let mut alloc = UlSliceUeCellGridAllocator::new(&mut bench.alloc, &mut candidate);
        for mut grant in grants {
            if alloc.remaining_rbs() == 0 {
                break;
            }
            grant.max_nof_rbs = alloc.remaining_rbs();
            alloc.allocate_ul_grant(&grant);
        }
        assert!(candidate.consumed_rbs() <= budget);
        assert!(candidate.consumed_rbs() > 0);

        let pusch_slot = bench.slot + 4;
        let granted: u32 = bench
            .grid
            .borrow()
            .slot_grants(pusch_slot)
            .ul
            .iter()
            .map(|g| g.rbs.length() as u32)
            .sum();
        assert_eq!(granted, candidate.consumed_rbs());
    }
}
