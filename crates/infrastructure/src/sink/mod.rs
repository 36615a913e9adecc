pub mod influx;
pub mod line_protocol;
pub mod memory_sink;

pub use influx::InfluxSink;
pub use memory_sink::InMemorySink;
