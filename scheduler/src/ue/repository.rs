//! UE Repository

use super::Ue;
use crate::SchedError;
use common::{DuUeIndex, Rnti, SlotPoint};
use tracing::info;

/// Set of UEs indexed by DU UE index. Storage is allocated at construction.
#[derive(Debug, Clone)]
pub struct UeRepository {
    ues: Vec<Option<Ue>>,
    nof_ues: usize,
}

impl UeRepository {
    pub fn new(max_nof_ues: usize) -> Self {
        Self {
            ues: (0..max_nof_ues).map(|_| None).collect(),
            nof_ues: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ues.len()
    }

    pub fn len(&self) -> usize {
        self.nof_ues
    }

    pub fn is_empty(&self) -> bool {
        self.nof_ues == 0
    }

    /// Insert a new UE
    pub fn add_ue(&mut self, ue: Ue) -> Result<(), SchedError> {
        let idx = ue.ue_index().as_usize();
        if idx >= self.ues.len() {
            return Err(SchedError::CapacityExceeded(format!(
                "ue={} beyond the maximum of {} UEs",
                ue.ue_index(),
                self.ues.len()
            )));
        }
        if self.ues[idx].is_some() {
            return Err(SchedError::InvalidState(format!("ue={} already exists", ue.ue_index())));
        }
        if self.find_by_rnti(ue.crnti()).is_some() {
            return Err(SchedError::InvalidState(format!("rnti={} already in use", ue.crnti())));
        }
        info!("Created ue={} rnti={} slice={}", ue.ue_index(), ue.crnti(), ue.slice_id());
        self.ues[idx] = Some(ue);
        self.nof_ues += 1;
        Ok(())
    }

    pub fn remove_ue(&mut self, ue_index: DuUeIndex) -> Option<Ue> {
        let removed = self.ues.get_mut(ue_index.as_usize()).and_then(Option::take);
        if let Some(ue) = &removed {
            info!("Removed ue={} rnti={}", ue.ue_index(), ue.crnti());
            self.nof_ues -= 1;
        }
        removed
    }

    pub fn contains(&self, ue_index: DuUeIndex) -> bool {
        self.get(ue_index).is_some()
    }

    pub fn get(&self, ue_index: DuUeIndex) -> Option<&Ue> {
        self.ues.get(ue_index.as_usize()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, ue_index: DuUeIndex) -> Option<&mut Ue> {
        self.ues.get_mut(ue_index.as_usize()).and_then(Option::as_mut)
    }

    pub fn find_by_rnti(&self, rnti: Rnti) -> Option<&Ue> {
        self.iter().find(|ue| ue.crnti() == rnti)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ue> {
        self.ues.iter().flatten()
    }

    /// Iterate over UEs in index order, starting at `start` and wrapping around
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = &Ue> {
        let cap = self.ues.len();
        let start = if cap == 0 { 0 } else { start % cap };
        self.ues[start..].iter().chain(self.ues[..start].iter()).flatten()
    }

    /// Advance HARQ timers of every UE
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        for ue in self.ues.iter_mut().flatten() {
            ue.slot_indication(slot);
        }
    }
}
