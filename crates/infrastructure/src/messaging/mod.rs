pub mod buffered_publisher;
pub mod memory_queue;
pub mod offline_buffer;
pub mod redis_queue;

pub use buffered_publisher::{BufferedQueuePublisher, PublisherSnapshot};
pub use memory_queue::InMemoryQueue;
pub use redis_queue::RedisQueue;
