//! Slice candidate for one slot and direction

use crate::{MAX_PDSCHS_PER_SLOT, MAX_PUSCHS_PER_SLOT};
use common::{LinkDirection, RanSliceId, SlotPoint};
use std::marker::PhantomData;

const MAX_GRANTS_PER_CANDIDATE: usize = if MAX_PDSCHS_PER_SLOT > MAX_PUSCHS_PER_SLOT {
    MAX_PDSCHS_PER_SLOT
} else {
    MAX_PUSCHS_PER_SLOT
};

/// Type-level link direction
pub trait LinkDirectionMarker {
    const DIRECTION: LinkDirection;
}

/// Downlink marker
#[derive(Debug, Clone, Copy)]
pub struct Dl;

/// Uplink marker
#[derive(Debug, Clone, Copy)]
pub struct Ul;

impl LinkDirectionMarker for Dl {
    const DIRECTION: LinkDirection = LinkDirection::Downlink;
}

impl LinkDirectionMarker for Ul {
    const DIRECTION: LinkDirection = LinkDirection::Uplink;
}

/// A RAN slice selected for scheduling in one slot, with its remaining RB
/// budget and the grants placed on its behalf
#[derive(Debug, Clone)]
pub struct RanSliceCandidate<D: LinkDirectionMarker> {
    id: RanSliceId,
    slot: SlotPoint,
    rb_budget: u32,
    consumed_rbs: u32,
    grants: heapless::Vec<u16, MAX_GRANTS_PER_CANDIDATE>,
    _dir: PhantomData<D>,
}

pub type DlRanSliceCandidate = RanSliceCandidate<Dl>;
pub type UlRanSliceCandidate = RanSliceCandidate<Ul>;

impl<D: LinkDirectionMarker> RanSliceCandidate<D> {
    pub fn new(id: RanSliceId, slot: SlotPoint, rb_budget: u32) -> Self {
        Self {
            id,
            slot,
            rb_budget,
            consumed_rbs: 0,
            grants: heapless::Vec::new(),
            _dir: PhantomData,
        }
    }

    pub fn id(&self) -> RanSliceId {
        self.id
    }

    pub fn direction(&self) -> LinkDirection {
        D::DIRECTION
    }

    pub fn slot(&self) -> SlotPoint {
        self.slot
    }

    pub fn rb_budget(&self) -> u32 {
        self.rb_budget
    }

    pub fn consumed_rbs(&self) -> u32 {
        self.consumed_rbs
    }

    /// RBs still available to the slice in this slot
    pub fn remaining_rbs(&self) -> u32 {
        self.rb_budget.saturating_sub(self.consumed_rbs)
    }

    /// Record a grant of `nof_rbs` committed on behalf of the slice
    pub fn store_grant(&mut self, nof_rbs: u32) {
        assert!(
            self.grants.push(nof_rbs as u16).is_ok(),
            "Slice {} {} candidate exceeded {} grants",
            self.id,
            D::DIRECTION,
            MAX_GRANTS_PER_CANDIDATE
        );
        self.consumed_rbs += nof_rbs;
    }

    /// RBs of each grant placed in this slot
    pub fn grants(&self) -> &[u16] {
        &self.grants
    }
}
