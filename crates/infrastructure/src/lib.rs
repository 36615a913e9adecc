//! Infrastructure layer - Redis queue transport, time-series sink, equipment files

pub mod config;
pub mod messaging;
pub mod repositories;
pub mod sink;

pub use config::ServiceConfig;
pub use messaging::{BufferedQueuePublisher, InMemoryQueue, PublisherSnapshot, RedisQueue};
pub use repositories::{EquipmentConfigWatcher, EquipmentLoader, EquipmentRegistry};
pub use sink::{InMemorySink, InfluxSink};
