//! Domain layer - Pure telemetry model with no I/O
//!
//! This crate contains:
//! - Tags, behaviors and value generators
//! - Equipment definitions and the per-equipment state machine
//! - Transport message, queue envelope and storage record
//! - Error taxonomy and health counters
//! - Ports (traits) for the broker queue, publisher and time-series sink
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Clock and randomness are passed in, never read ambiently
//! - Testable in isolation

pub mod broker;
pub mod equipment;
pub mod error;
pub mod health;
pub mod message;
pub mod sink;
pub mod tag;

// Re-export commonly used types
pub use equipment::{Equipment, EquipmentSet, EquipmentStateMachine};
pub use error::{DomainError, ErrorClass, SinkWriteError};
pub use message::{QueueEnvelope, StorageRecord, TransportMessage};
pub use tag::{Tag, TagId, TagQuality, TagValue};
