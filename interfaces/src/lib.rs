//! Scheduler Indication Interfaces Library
//! 
//! This crate provides the hand-off between execution contexts that produce
//! scheduler inputs (HARQ feedback, buffer state reports, UE configuration)
//! and the single execution context that runs the slot scheduler.

pub mod indication_queue;
pub mod message_types;

pub use indication_queue::{indication_queue, IndicationReceiver, IndicationSender};
pub use message_types::*;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    
    #[error("Indication queue full (capacity {0})")]
    QueueFull(usize),
    
    #[error("Indication queue closed")]
    QueueClosed,
    
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
