use async_trait::async_trait;

use crate::error::SinkWriteError;
use crate::message::StorageRecord;

/// The time-series store. A call writes the whole batch or fails as a whole.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_batch(&self, records: &[StorageRecord]) -> Result<(), SinkWriteError>;
}
