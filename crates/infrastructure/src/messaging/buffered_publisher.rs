use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::broker::{ConnectionState, MessagePublisher, PublishOutcome, QueueTransport};
use domain::health::ErrorTracker;
use domain::message::{QueueEnvelope, QueueNaming, TransportMessage};
use domain::DomainError;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::messaging::offline_buffer::{BufferPush, OfflineBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherSnapshot {
    pub connection_state: ConnectionState,
    pub connected: bool,
    pub buffer_depth: usize,
    pub published: u64,
    pub buffered: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct PublisherStats {
    published: AtomicU64,
    buffered: AtomicU64,
    dropped: AtomicU64,
}

struct PublisherInner {
    transport: Arc<dyn QueueTransport>,
    buffer: OfflineBuffer,
    naming: QueueNaming,
    config: BrokerConfig,
    max_retries: u32,
    state: Mutex<ConnectionState>,
    stats: PublisherStats,
    errors: Arc<ErrorTracker>,
    wake: Notify,
}

/// Store-and-forward publisher.
///
/// Pushes straight to the broker while it is reachable and the backlog is
/// empty. Otherwise envelopes wait in a bounded buffer that a background
/// flusher drains in FIFO order once the broker answers again.
#[derive(Clone)]
pub struct BufferedQueuePublisher {
    inner: Arc<PublisherInner>,
}

impl BufferedQueuePublisher {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        config: &BrokerConfig,
        max_retries: u32,
        errors: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                transport,
                buffer: OfflineBuffer::new(config.buffer_capacity, config.overflow_policy),
                naming: QueueNaming::new(config.queue_prefix.clone()),
                config: config.clone(),
                max_retries,
                state: Mutex::new(ConnectionState::Disconnected),
                stats: PublisherStats::default(),
                errors,
                wake: Notify::new(),
            }),
        }
    }

    /// One connection attempt; failures are left to the flusher
    pub async fn connect(&self) -> bool {
        self.inner.transition(ConnectionState::begin_attempt);
        match self.inner.transport.ping().await {
            Ok(()) => {
                self.inner.transition(ConnectionState::on_success);
                info!("✅ Broker reachable");
                true
            }
            Err(e) => {
                self.inner.transition(ConnectionState::on_failure);
                self.inner.errors.record_error(&e);
                warn!("Broker not reachable yet ({}). Messages will be buffered.", e);
                false
            }
        }
    }

    pub fn start_flusher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!("🔄 Starting buffer flusher...");
            inner.run_flusher(cancel).await;
            debug!("Buffer flusher stopped");
        })
    }

    /// Flushes the backlog until it is empty or `grace` runs out.
    /// Returns how many envelopes were abandoned.
    pub async fn drain(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let retry_pause = self.inner.config.reconnect_initial_delay();

        while !self.inner.buffer.is_empty() {
            match tokio::time::timeout_at(deadline, self.inner.flush_once()).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => {
                    let resume = (Instant::now() + retry_pause).min(deadline);
                    tokio::time::sleep_until(resume).await;
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let abandoned = self.inner.buffer.len();
        if abandoned > 0 {
            self.inner.transition(|_| ConnectionState::Failed);
            warn!(abandoned, "⚠️ Publisher buffer abandoned at shutdown");
        } else {
            info!("Publisher buffer drained");
        }
        abandoned
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn buffer_depth(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn snapshot(&self) -> PublisherSnapshot {
        let state = self.inner.state();
        PublisherSnapshot {
            connection_state: state,
            connected: state.is_connected(),
            buffer_depth: self.inner.buffer.len(),
            published: self.inner.stats.published.load(Ordering::Relaxed),
            buffered: self.inner.stats.buffered.load(Ordering::Relaxed),
            dropped: self.inner.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

impl PublisherInner {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, f: impl FnOnce(&ConnectionState) -> ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = f(&*state);
        *state = next;
    }

    fn buffer(&self, queue: String, payload: String) -> PublishOutcome {
        let outcome = match self.buffer.push(queue, payload) {
            BufferPush::Accepted { depth } => {
                self.stats.buffered.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Buffered { depth, evicted: 0 }
            }
            BufferPush::Evicted { depth } => {
                self.stats.buffered.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(depth, "Publisher buffer full, dropped oldest envelope");
                PublishOutcome::Buffered { depth, evicted: 1 }
            }
            BufferPush::Rejected { depth } => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(depth, "Publisher buffer full, rejected newest envelope");
                PublishOutcome::Rejected { depth }
            }
        };
        self.wake.notify_one();
        outcome
    }

    /// Pushes up to one flush batch from the head of the backlog
    async fn flush_once(&self) -> Result<usize, DomainError> {
        if !self.transport.is_connected() || !self.state().is_connected() {
            self.transition(ConnectionState::begin_attempt);
            if let Err(e) = self.transport.ping().await {
                self.transition(ConnectionState::on_failure);
                return Err(e);
            }
            self.transition(ConnectionState::on_success);
            info!(
                "✅ Broker reachable again, {} buffered envelopes to flush",
                self.buffer.len()
            );
        }

        let mut flushed = 0;
        for _ in 0..self.config.flush_batch_size.max(1) {
            let Some(entry) = self.buffer.peek() else {
                break;
            };
            if let Err(e) = self.transport.push(&entry.queue, entry.payload.clone()).await {
                self.transition(ConnectionState::on_failure);
                warn!("Flusher paused: broker push failed: {}", e);
                self.errors.record_error(&e);
                return Err(e);
            }
            self.buffer.ack(entry.seq);
            self.stats.published.fetch_add(1, Ordering::Relaxed);
            flushed += 1;
        }

        if flushed > 0 {
            debug!(flushed, remaining = self.buffer.len(), "📤 Flushed buffered envelopes");
        }
        Ok(flushed)
    }

    async fn run_flusher(&self, cancel: CancellationToken) {
        let initial = self.config.reconnect_initial_delay();
        let max = self.config.reconnect_max_delay();
        let mut backoff = initial;

        loop {
            let connected = self.state().is_connected();
            let wait = if connected { initial } else { backoff };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified(), if connected => {}
                _ = tokio::time::sleep(wait) => {}
            }

            if self.buffer.is_empty() {
                continue;
            }

            match self.flush_once().await {
                Ok(_) => {
                    backoff = initial;
                    if !self.buffer.is_empty() {
                        self.wake.notify_one();
                    }
                }
                Err(e) => {
                    debug!(retry_in_ms = backoff.as_millis() as u64, "Broker still unavailable: {}", e);
                    backoff = (backoff * 2).min(max);
                }
            }
        }
    }
}

#[async_trait]
impl MessagePublisher for BufferedQueuePublisher {
    async fn publish(&self, message: TransportMessage) -> Result<PublishOutcome, DomainError> {
        let inner = &self.inner;
        let queue = inner.naming.queue_for(&message.equipment_id);
        let envelope = QueueEnvelope::new(message, inner.max_retries);
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| DomainError::Validation(format!("cannot serialize envelope: {e}")))?;

        // Keep FIFO behind an existing backlog
        if !inner.buffer.is_empty() {
            return Ok(inner.buffer(queue, payload));
        }

        // 1. Check connection first (client-side offline detection)
        if !inner.transport.is_connected() {
            debug!(queue = %queue, "Broker offline. Buffering envelope...");
            return Ok(inner.buffer(queue, payload));
        }

        // 2. Try publish immediately, buffer on failure
        match inner.transport.push(&queue, payload.clone()).await {
            Ok(()) => {
                inner.stats.published.fetch_add(1, Ordering::Relaxed);
                if !inner.state().is_connected() {
                    inner.transition(ConnectionState::on_success);
                }
                Ok(PublishOutcome::Delivered)
            }
            Err(e) => {
                warn!(queue = %queue, "Broker push failed ({}). Buffering envelope...", e);
                inner.transition(ConnectionState::on_failure);
                inner.errors.record_error(&e);
                Ok(inner.buffer(queue, payload))
            }
        }
    }
}
