use async_trait::async_trait;

use crate::error::DomainError;
use crate::message::TransportMessage;

/// What happened to a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Pushed to the broker queue
    Delivered,
    /// Held in the offline buffer; `evicted` older entries were dropped to make room
    Buffered { depth: usize, evicted: usize },
    /// Buffer full under the reject-newest policy; the message was dropped
    Rejected { depth: usize },
}

impl PublishOutcome {
    pub fn dropped(&self) -> usize {
        match self {
            Self::Delivered => 0,
            Self::Buffered { evicted, .. } => *evicted,
            Self::Rejected { .. } => 1,
        }
    }
}

#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: TransportMessage) -> Result<PublishOutcome, DomainError>;
}
