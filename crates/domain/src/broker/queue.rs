use async_trait::async_trait;

use crate::error::DomainError;

/// Named FIFO queues on the message broker.
///
/// Payloads are opaque strings; producers push to the tail and consumers
/// pop from the head.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn push(&self, queue: &str, payload: String) -> Result<(), DomainError>;

    /// Pops up to `max` payloads; an empty queue yields an empty batch
    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>, DomainError>;

    async fn depth(&self, queue: &str) -> Result<usize, DomainError>;

    async fn ping(&self) -> Result<(), DomainError>;

    /// Last known link status, without a round trip
    fn is_connected(&self) -> bool;
}
