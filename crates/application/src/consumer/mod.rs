pub mod queue_consumer;
pub mod retry;

pub use queue_consumer::{ConsumerSettings, ConsumerSnapshot, QueueConsumer};
pub use retry::RetryPolicy;
