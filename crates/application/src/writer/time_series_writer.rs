use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::SinkWriteError;
use domain::message::StorageRecord;
use domain::sink::TimeSeriesSink;
use infrastructure::config::WriterConfig;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterSnapshot {
    pub records_written: u64,
    pub batches_flushed: u64,
    pub failed_batches: u64,
    pub write_retries: u64,
    pub isolated_writes: u64,
}

#[derive(Debug, Default)]
struct WriterStats {
    records_written: AtomicU64,
    batches_flushed: AtomicU64,
    failed_batches: AtomicU64,
    write_retries: AtomicU64,
    isolated_writes: AtomicU64,
}

struct WriteRequest {
    records: Vec<StorageRecord>,
    reply: oneshot::Sender<Result<(), SinkWriteError>>,
}

/// Handle to the writer task. Submissions are batched by size or interval,
/// whichever comes first, and every submitter gets the outcome of the flush
/// that carried its records.
///
/// A batch rejected as permanent is rewritten per submission, so only the
/// submissions the sink really refuses see the error.
#[derive(Clone)]
pub struct TimeSeriesWriter {
    tx: mpsc::Sender<WriteRequest>,
    stats: Arc<WriterStats>,
}

impl TimeSeriesWriter {
    /// Starts the writer task. Cancelling `cancel` flushes what is pending and stops it.
    pub fn spawn(
        sink: Arc<dyn TimeSeriesSink>,
        config: WriterConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let stats = Arc::new(WriterStats::default());

        let actor = WriterActor {
            sink,
            config,
            rx,
            stats: stats.clone(),
            pending: Vec::new(),
            pending_records: 0,
        };
        let handle = tokio::spawn(actor.run(cancel));

        (Self { tx, stats }, handle)
    }

    /// Resolves once the batch holding these records has been flushed
    pub async fn write(&self, records: Vec<StorageRecord>) -> Result<(), SinkWriteError> {
        if records.is_empty() {
            return Ok(());
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest { records, reply })
            .await
            .map_err(|_| SinkWriteError::Transient("writer stopped".to_string()))?;
        rx.await
            .map_err(|_| SinkWriteError::Transient("writer stopped before flushing".to_string()))?
    }

    pub fn snapshot(&self) -> WriterSnapshot {
        WriterSnapshot {
            records_written: self.stats.records_written.load(Ordering::Relaxed),
            batches_flushed: self.stats.batches_flushed.load(Ordering::Relaxed),
            failed_batches: self.stats.failed_batches.load(Ordering::Relaxed),
            write_retries: self.stats.write_retries.load(Ordering::Relaxed),
            isolated_writes: self.stats.isolated_writes.load(Ordering::Relaxed),
        }
    }
}

struct WriterActor {
    sink: Arc<dyn TimeSeriesSink>,
    config: WriterConfig,
    rx: mpsc::Receiver<WriteRequest>,
    stats: Arc<WriterStats>,
    pending: Vec<WriteRequest>,
    pending_records: usize,
}

impl WriterActor {
    async fn run(mut self, cancel: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "Starting time-series writer"
        );
        let mut ticker = tokio::time::interval(self.config.flush_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    while let Ok(request) = self.rx.try_recv() {
                        self.accept(request);
                    }
                    self.flush(&mut ticker).await;
                    break;
                }
                request = self.rx.recv() => match request {
                    Some(request) => {
                        self.accept(request);
                        if self.pending_records >= self.config.batch_size {
                            self.flush(&mut ticker).await;
                        }
                    }
                    None => {
                        self.flush(&mut ticker).await;
                        break;
                    }
                },
                _ = ticker.tick() => self.flush(&mut ticker).await,
            }
        }
        info!("Time-series writer stopped");
    }

    fn accept(&mut self, request: WriteRequest) {
        self.pending_records += request.records.len();
        self.pending.push(request);
    }

    async fn flush(&mut self, ticker: &mut Interval) {
        ticker.reset();
        if self.pending.is_empty() {
            return;
        }
        let submissions = std::mem::take(&mut self.pending);
        self.pending_records = 0;

        let records: Vec<StorageRecord> = submissions
            .iter()
            .flat_map(|s| s.records.iter().cloned())
            .collect();
        let result = self.write_with_retry(&records).await;

        match result {
            Err(SinkWriteError::Permanent(e)) if submissions.len() > 1 => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    records = records.len(),
                    submitters = submissions.len(),
                    "⚠️ Batch rejected, rewriting submissions one by one: {}",
                    e
                );
                for submission in submissions {
                    self.stats.isolated_writes.fetch_add(1, Ordering::Relaxed);
                    let result = self.write_with_retry(&submission.records).await;
                    self.record_outcome(submission.records.len(), 1, &result);
                    let _ = submission.reply.send(result);
                }
            }
            result => {
                self.record_outcome(records.len(), submissions.len(), &result);
                for submission in submissions {
                    let _ = submission.reply.send(result.clone());
                }
            }
        }
    }

    fn record_outcome(&self, records: usize, submitters: usize, result: &Result<(), SinkWriteError>) {
        match result {
            Ok(()) => {
                self.stats
                    .records_written
                    .fetch_add(records as u64, Ordering::Relaxed);
                self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
                debug!(records, "📤 Batch flushed");
            }
            Err(e) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                error!(records, submitters, "Batch write failed: {}", e);
            }
        }
    }

    async fn write_with_retry(&self, records: &[StorageRecord]) -> Result<(), SinkWriteError> {
        let mut attempt = 0;
        loop {
            match self.sink.write_batch(records).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    self.stats.write_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt,
                        max = self.config.retry_attempts,
                        "⚠️ Sink write failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
