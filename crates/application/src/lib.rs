//! Application layer - Simulation, publishing and ingestion workflows

pub mod consumer;
pub mod simulator;
pub mod writer;

pub use consumer::{ConsumerSettings, QueueConsumer, RetryPolicy};
pub use simulator::{Simulator, SimulatorHandle, spawn_publish_pump};
pub use writer::TimeSeriesWriter;
