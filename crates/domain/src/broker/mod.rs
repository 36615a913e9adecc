mod connection_state;
mod publisher;
mod queue;

pub use connection_state::ConnectionState;
pub use publisher::{MessagePublisher, PublishOutcome};
pub use queue::QueueTransport;

#[cfg(any(test, feature = "mocks"))]
pub use publisher::MockMessagePublisher;
#[cfg(any(test, feature = "mocks"))]
pub use queue::MockQueueTransport;
