pub mod time_series_writer;

pub use time_series_writer::{TimeSeriesWriter, WriterSnapshot};
