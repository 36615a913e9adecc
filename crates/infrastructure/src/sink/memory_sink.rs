use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use domain::SinkWriteError;
use domain::message::StorageRecord;
use domain::sink::TimeSeriesSink;
use std::time::Duration;

use tokio::time::Instant;

/// Records every write in memory. Failures can be scripted per call.
#[derive(Debug, Default)]
pub struct InMemorySink {
    records: Mutex<Vec<StorageRecord>>,
    attempts: Mutex<Vec<Instant>>,
    scripted: Mutex<VecDeque<SinkWriteError>>,
    always: Mutex<Option<SinkWriteError>>,
    rejected: Mutex<Option<(String, SinkWriteError)>>,
    delay: Mutex<Option<Duration>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` writes fail with `error`
    pub fn fail_next(&self, n: usize, error: SinkWriteError) {
        let mut scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
        scripted.extend(std::iter::repeat_n(error, n));
    }

    /// Every write fails with `error` until cleared with `None`
    pub fn fail_always(&self, error: Option<SinkWriteError>) {
        *self.always.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Any batch holding a record of `equipment_id` fails with `error`,
    /// the way a real sink refuses a whole body over one bad line
    pub fn reject_equipment(&self, equipment_id: &str, error: SinkWriteError) {
        *self.rejected.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((equipment_id.to_string(), error));
    }

    /// Every write takes `delay` before it completes
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    pub fn records(&self) -> Vec<StorageRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Time of every write attempt, successful or not
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record count of every write attempt, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TimeSeriesSink for InMemorySink {
    async fn write_batch(&self, records: &[StorageRecord]) -> Result<(), SinkWriteError> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(records.len());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }
        if let Some((equipment_id, error)) = self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let poisoned = records
                .iter()
                .any(|r| r.tags.get("equipment_id") == Some(equipment_id));
            if poisoned {
                return Err(error.clone());
            }
        }
        if let Some(error) = self
            .always
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }
}
