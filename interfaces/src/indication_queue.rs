//! Indication Queue
//! 
//! Fixed-capacity hand-off of scheduler inputs from any execution context to
//! the scheduling context. Producers never block on a full queue and the
//! consumer never waits on an empty one.

use crate::{message_types::SchedIndication, InterfaceError};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

/// Create a connected sender/receiver pair
pub fn indication_queue(capacity: usize) -> (IndicationSender, IndicationReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    debug!("Created indication queue with capacity {}", capacity);
    (
        IndicationSender { tx, capacity },
        IndicationReceiver { rx },
    )
}

/// Producer side, cloneable across tasks and threads
#[derive(Debug, Clone)]
pub struct IndicationSender {
    tx: mpsc::Sender<SchedIndication>,
    capacity: usize,
}

impl IndicationSender {
    /// Enqueue without waiting
    pub fn try_push(&self, indication: SchedIndication) -> Result<(), InterfaceError> {
        match self.tx.try_send(indication) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(ind)) => {
                warn!("Indication queue full, dropping indication for ue={}", ind.ue_index());
                Err(InterfaceError::QueueFull(self.capacity))
            }
            Err(TrySendError::Closed(_)) => Err(InterfaceError::QueueClosed),
        }
    }

    /// Enqueue, waiting for space. For async producers outside the slot loop.
    pub async fn push(&self, indication: SchedIndication) -> Result<(), InterfaceError> {
        self.tx
            .send(indication)
            .await
            .map_err(|_| InterfaceError::QueueClosed)
    }
}

/// Consumer side, owned by the scheduling context
#[derive(Debug)]
pub struct IndicationReceiver {
    rx: mpsc::Receiver<SchedIndication>,
}

impl IndicationReceiver {
    /// Dequeue the next indication, if any
    pub fn try_pop(&mut self) -> Option<SchedIndication> {
        match self.rx.try_recv() {
            Ok(ind) => Some(ind),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of queued indications
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_types::DlBufferStateIndication;
    use common::{DuUeIndex, Lcid};

    fn dl_bs(ue: u16, bs: u32) -> SchedIndication {
        SchedIndication::DlBufferState(DlBufferStateIndication {
            ue_index: DuUeIndex::new(ue),
            lcid: Lcid::new(Lcid::MIN_DRB),
            bs,
        })
    }

    #[test]
    fn test_fifo_hand_off() {
        let (tx, mut rx) = indication_queue(4);
        tx.try_push(dl_bs(0, 10)).unwrap();
        tx.try_push(dl_bs(1, 20)).unwrap();
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_pop(), Some(dl_bs(0, 10)));
        assert_eq!(rx.try_pop(), Some(dl_bs(1, 20)));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let (tx, _rx) = indication_queue(1);
        tx.try_push(dl_bs(0, 10)).unwrap();
        assert!(matches!(tx.try_push(dl_bs(0, 11)), Err(InterfaceError::QueueFull(1))));
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = indication_queue(1);
        drop(rx);
        assert!(matches!(tx.try_push(dl_bs(0, 10)), Err(InterfaceError::QueueClosed)));
    }

    #[test]
    fn test_cross_thread_producer() {
        let (tx, mut rx) = indication_queue(16);
        let producer = std::thread::spawn(move || {
            for i in 0..8 {
                tx.try_push(dl_bs(i, 100)).unwrap();
            }
        });
        producer.join().unwrap();
        let mut count = 0;
        while rx.try_pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 8);
    }
}
