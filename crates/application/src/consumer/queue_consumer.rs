use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use domain::broker::QueueTransport;
use domain::health::ErrorTracker;
use domain::message::{
    DeadLetterEntry, QueueEnvelope, QueueNaming, StorageRecord, decode_envelope,
};
use domain::{DomainError, SinkWriteError};
use infrastructure::ServiceConfig;
use infrastructure::config::ConsumerConfig;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::consumer::retry::RetryPolicy;
use crate::writer::TimeSeriesWriter;

/// Everything the consumer needs beyond its collaborators
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub consumer: ConsumerConfig,
    pub queue_prefix: String,
    pub dead_letter_queue: String,
    pub measurement: String,
}

impl ConsumerSettings {
    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            consumer: config.consumer.clone(),
            queue_prefix: config.broker.queue_prefix.clone(),
            dead_letter_queue: config.broker.dead_letter_queue.clone(),
            measurement: config.writer.measurement.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSnapshot {
    /// Queue name to depth, dead-letter queue included
    pub queues: BTreeMap<String, usize>,
    pub processed: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub records_written: u64,
    /// Envelopes pushed back untouched because shutdown cut them short
    pub returned: u64,
}

#[derive(Debug, Default)]
struct ConsumerStats {
    processed: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    records_written: AtomicU64,
    returned: AtomicU64,
}

/// How one envelope ended up
#[derive(Debug, Clone, PartialEq)]
enum Disposition {
    Delivered { records: usize },
    Retried { retry_count: u32, delay: Duration },
    DeadLettered,
    Returned,
}

struct ConsumerInner {
    transport: Arc<dyn QueueTransport>,
    writer: TimeSeriesWriter,
    settings: ConsumerSettings,
    naming: QueueNaming,
    policy: RetryPolicy,
    errors: Arc<ErrorTracker>,
    stats: ConsumerStats,
    stop: CancellationToken,
    /// Cuts in-flight writes short once the shutdown grace period is over
    abandon: CancellationToken,
    retry_cancel: CancellationToken,
    retries: TaskTracker,
}

struct QueueWorkers {
    handles: Vec<JoinHandle<()>>,
    retire: CancellationToken,
}

#[derive(Default)]
struct WorkerSet {
    active: HashMap<String, QueueWorkers>,
    /// Workers of removed equipment, still draining their queue
    retiring: Vec<JoinHandle<()>>,
}

/// Pulls envelopes off the per-equipment queues, writes their records and
/// routes failures to a delayed retry or the dead-letter queue.
///
/// Each worker handles one envelope at a time, so `concurrency` bounds the
/// envelopes in flight per queue.
#[derive(Clone)]
pub struct QueueConsumer {
    inner: Arc<ConsumerInner>,
    workers: Arc<Mutex<WorkerSet>>,
}

impl QueueConsumer {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        writer: TimeSeriesWriter,
        settings: ConsumerSettings,
        errors: Arc<ErrorTracker>,
    ) -> Self {
        let naming = QueueNaming::new(settings.queue_prefix.clone());
        let policy = RetryPolicy::from_config(&settings.consumer);
        Self {
            inner: Arc::new(ConsumerInner {
                transport,
                writer,
                settings,
                naming,
                policy,
                errors,
                stats: ConsumerStats::default(),
                stop: CancellationToken::new(),
                abandon: CancellationToken::new(),
                retry_cancel: CancellationToken::new(),
                retries: TaskTracker::new(),
            }),
            workers: Arc::new(Mutex::new(WorkerSet::default())),
        }
    }

    /// Starts workers for every equipment queue not already being consumed.
    /// Returns how many queues were started.
    pub async fn ensure_queues<'a>(&self, equipment_ids: impl IntoIterator<Item = &'a str>) -> usize {
        if self.inner.stop.is_cancelled() {
            return 0;
        }
        let mut workers = self.workers.lock().await;
        let mut started = 0;

        for equipment_id in equipment_ids {
            let queue = self.inner.naming.queue_for(equipment_id);
            if workers.active.contains_key(&queue) {
                continue;
            }

            let concurrency = self.inner.settings.consumer.concurrency.max(1);
            let retire = CancellationToken::new();
            let handles = (0..concurrency)
                .map(|worker| {
                    let inner = self.inner.clone();
                    let queue = queue.clone();
                    let retire = retire.clone();
                    tokio::spawn(async move { inner.run_worker(queue, worker, retire).await })
                })
                .collect();

            info!(queue = %queue, concurrency, "📥 Consuming queue");
            workers.active.insert(queue, QueueWorkers { handles, retire });
            started += 1;
        }

        started
    }

    /// Retires the queues of equipment no longer listed. Their workers keep
    /// going until the queue is empty, then exit. Returns how many were retired.
    pub async fn retire_missing<'a>(&self, equipment_ids: impl IntoIterator<Item = &'a str>) -> usize {
        let keep: HashSet<String> = equipment_ids
            .into_iter()
            .map(|id| self.inner.naming.queue_for(id))
            .collect();

        let mut workers = self.workers.lock().await;
        let gone: Vec<String> = workers
            .active
            .keys()
            .filter(|queue| !keep.contains(*queue))
            .cloned()
            .collect();

        for queue in &gone {
            if let Some(retired) = workers.active.remove(queue) {
                retired.retire.cancel();
                workers.retiring.extend(retired.handles);
                info!(queue = %queue, "Retiring queue once drained");
            }
        }
        workers.retiring.retain(|handle| !handle.is_finished());
        gone.len()
    }

    pub async fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.workers.lock().await.active.keys().cloned().collect();
        queues.sort();
        queues
    }

    /// Worker loops still running, draining ones included
    pub async fn running_workers(&self) -> usize {
        let workers = self.workers.lock().await;
        workers
            .active
            .values()
            .flat_map(|q| q.handles.iter())
            .chain(workers.retiring.iter())
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub async fn snapshot(&self) -> ConsumerSnapshot {
        let mut queues = BTreeMap::new();
        let mut names = self.queues().await;
        names.push(self.inner.settings.dead_letter_queue.clone());

        for name in names {
            match self.inner.transport.depth(&name).await {
                Ok(depth) => {
                    queues.insert(name, depth);
                }
                Err(e) => debug!(queue = %name, "Depth unavailable: {}", e),
            }
        }

        let stats = &self.inner.stats;
        ConsumerSnapshot {
            queues,
            processed: stats.processed.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            retried: stats.retried.load(Ordering::Relaxed),
            dead_lettered: stats.dead_lettered.load(Ordering::Relaxed),
            records_written: stats.records_written.load(Ordering::Relaxed),
            returned: stats.returned.load(Ordering::Relaxed),
        }
    }

    /// Lets in-flight envelopes finish within `grace`. Envelopes still
    /// writing after that are pushed back onto their queue untouched. Every
    /// pending retry is then re-enqueued without waiting out its delay.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.stop.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            let mut handles: Vec<JoinHandle<()>> = workers
                .active
                .drain()
                .flat_map(|(_, queue)| queue.handles)
                .collect();
            handles.append(&mut workers.retiring);
            handles
        };
        let aborts: Vec<AbortHandle> = handles.iter().map(JoinHandle::abort_handle).collect();

        let finished = async move {
            for handle in handles {
                let _ = handle.await;
            }
        };
        tokio::pin!(finished);

        if tokio::time::timeout(grace, &mut finished).await.is_err() {
            warn!("⚠️ Consumer workers still busy after grace period, returning in-flight envelopes");
            self.inner.abandon.cancel();
            if tokio::time::timeout(grace, &mut finished).await.is_err() {
                error!(workers = aborts.len(), "Consumer workers unresponsive, aborting");
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        self.inner.retry_cancel.cancel();
        self.inner.retries.close();
        let pending = self.inner.retries.len();
        if pending > 0 {
            info!(pending, "Re-enqueueing pending retries");
        }
        self.inner.retries.wait().await;

        let returned = self.inner.stats.returned.load(Ordering::Relaxed);
        if returned > 0 {
            warn!(returned, "Envelopes returned to their queues at shutdown");
        }
        info!("Queue consumer stopped");
    }
}

impl ConsumerInner {
    async fn run_worker(self: Arc<Self>, queue: String, worker: usize, retire: CancellationToken) {
        debug!(queue = %queue, worker, "Worker started");
        let batch_size = self.settings.consumer.batch_size.max(1);
        let poll_interval = self.settings.consumer.poll_interval();

        while !self.stop.is_cancelled() {
            let batch = match self.transport.pop_batch(&queue, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(queue = %queue, "Pop failed: {}", e);
                    self.errors.record_error(&e);
                    self.idle(poll_interval).await;
                    continue;
                }
            };

            if batch.is_empty() {
                if retire.is_cancelled() {
                    info!(queue = %queue, worker, "Queue drained, worker retired");
                    return;
                }
                self.idle(poll_interval).await;
                continue;
            }

            // Envelopes not started when shutdown begins go back on the queue
            for raw in batch {
                if self.stop.is_cancelled() {
                    self.return_to_queue(&queue, raw).await;
                } else {
                    self.clone().process(&queue, raw).await;
                }
            }
        }
        debug!(queue = %queue, worker, "Worker stopped");
    }

    async fn idle(&self, period: Duration) {
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = tokio::time::sleep(period) => {}
        }
    }

    async fn process(self: Arc<Self>, queue: &str, raw: String) -> Disposition {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let envelope = match self.decode(queue, &raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(queue = %queue, "Rejecting malformed payload: {}", e);
                self.dead_letter(queue, &e, DeadLetterEntry::payload_value(&raw), 0)
                    .await;
                return Disposition::DeadLettered;
            }
        };

        let records =
            StorageRecord::from_message(&self.settings.measurement, &envelope.message);
        let count = records.len();
        let timeout = self.settings.consumer.processing_timeout();
        let write = tokio::time::timeout(timeout, self.writer.write(records));
        let result = tokio::select! {
            biased;
            _ = self.abandon.cancelled() => {
                self.return_to_queue(queue, raw).await;
                return Disposition::Returned;
            }
            result = write => match result {
                Ok(result) => result,
                Err(_) => Err(SinkWriteError::Transient(format!(
                    "processing timed out after {}ms",
                    timeout.as_millis()
                ))),
            },
        };

        match result {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .records_written
                    .fetch_add(count as u64, Ordering::Relaxed);
                Disposition::Delivered { records: count }
            }
            Err(e) if e.is_transient() && envelope.can_retry() => self.schedule_retry(queue, envelope, e),
            Err(e) => {
                let retry_count = envelope.retry_count;
                let message = serde_json::to_value(&envelope).unwrap_or(Value::Null);
                self.dead_letter(queue, &DomainError::SinkWrite(e), message, retry_count)
                    .await;
                Disposition::DeadLettered
            }
        }
    }

    async fn return_to_queue(&self, queue: &str, raw: String) {
        match self.transport.push(queue, raw).await {
            Ok(()) => {
                self.stats.returned.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.errors.record_error(&e);
                error!(queue = %queue, "Envelope lost, push back failed: {}", e);
            }
        }
    }

    fn decode(&self, queue: &str, raw: &str) -> Result<QueueEnvelope, DomainError> {
        let envelope = decode_envelope(raw, self.settings.consumer.max_retries)?;
        if let Some(expected) = self.naming.equipment_for(queue) {
            if envelope.message.equipment_id != expected {
                return Err(DomainError::Validation(format!(
                    "equipmentId '{}' does not belong on queue '{}'",
                    envelope.message.equipment_id, queue
                )));
            }
        }
        Ok(envelope)
    }

    fn schedule_retry(
        self: Arc<Self>,
        queue: &str,
        envelope: QueueEnvelope,
        error: SinkWriteError,
    ) -> Disposition {
        let delay = self.policy.delay_for(envelope.retry_count);
        let next = envelope.next_attempt();
        let retry_count = next.retry_count;
        self.stats.retried.fetch_add(1, Ordering::Relaxed);
        self.errors.record_error(&DomainError::SinkWrite(error.clone()));
        warn!(
            queue = %queue,
            message_id = %next.message.id,
            retry_count,
            delay_ms = delay.as_millis() as u64,
            "🔄 Scheduling retry: {}",
            error
        );

        let queue = queue.to_string();
        let inner = self.clone();
        self.retries.spawn(async move {
            tokio::select! {
                _ = inner.retry_cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            inner.requeue(&queue, &next).await;
        });

        Disposition::Retried { retry_count, delay }
    }

    async fn requeue(&self, queue: &str, envelope: &QueueEnvelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(queue = %queue, "Cannot serialize envelope for retry: {}", e);
                return;
            }
        };
        if let Err(e) = self.transport.push(queue, payload).await {
            self.errors.record_error(&e);
            error!(
                queue = %queue,
                message_id = %envelope.message.id,
                "Retry lost, re-enqueue failed: {}",
                e
            );
        }
    }

    async fn dead_letter(&self, queue: &str, error: &DomainError, message: Value, retry_count: u32) {
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.errors.record_error(error);

        let entry = DeadLetterEntry::new(queue, error.to_string(), error.class(), message, retry_count);
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                error!(queue = %queue, "Cannot serialize dead-letter entry: {}", e);
                return;
            }
        };

        match self
            .transport
            .push(&self.settings.dead_letter_queue, payload)
            .await
        {
            Ok(()) => warn!(queue = %queue, retry_count, class = error.class().as_str(), "☠️ Dead-lettered: {}", error),
            Err(e) => {
                self.errors.record_error(&e);
                error!(queue = %queue, "Dead-letter push failed, entry lost: {}", e);
            }
        }
    }
}
