use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::DomainError;
use domain::broker::QueueTransport;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Redis lists as broker queues: RPUSH to produce, `LPOP key count` to
/// consume, LLEN for lag.
///
/// The multiplexed connection is opened lazily and dropped on the first
/// failure so the next call reconnects.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    connected: Arc<AtomicBool>,
    operation_timeout: Duration,
}

impl RedisQueue {
    pub fn connect(redis_url: &str, operation_timeout: Duration) -> Result<Self, DomainError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DomainError::Configuration(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            operation_timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DomainError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.operation_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| self.mark_failed("connect timed out".to_string()))?
        .map_err(|e| self.mark_failed(format!("connect failed: {e}")))?;

        if !self.connected.swap(true, Ordering::Relaxed) {
            info!("Redis connected");
        }
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn run<T, F, Fut>(&self, op: &str, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match tokio::time::timeout(self.operation_timeout, f(conn)).await {
            Ok(Ok(value)) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.drop_connection().await;
                Err(self.mark_failed(format!("{op} failed: {e}")))
            }
            Err(_) => {
                self.drop_connection().await;
                Err(self.mark_failed(format!("{op} timed out")))
            }
        }
    }

    async fn drop_connection(&self) {
        self.connection.lock().await.take();
    }

    fn mark_failed(&self, message: String) -> DomainError {
        if self.connected.swap(false, Ordering::Relaxed) {
            warn!("Redis link lost: {}", message);
        } else {
            debug!("Redis still unavailable: {}", message);
        }
        DomainError::Transport(message)
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<(), DomainError> {
        self.run("RPUSH", |mut conn| async move {
            conn.rpush::<_, _, ()>(queue, payload).await
        })
        .await
    }

    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>, DomainError> {
        let Some(count) = NonZeroUsize::new(max) else {
            return Ok(Vec::new());
        };
        let popped: Option<Vec<String>> = self
            .run("LPOP", |mut conn| async move {
                conn.lpop(queue, Some(count)).await
            })
            .await?;
        Ok(popped.unwrap_or_default())
    }

    async fn depth(&self, queue: &str) -> Result<usize, DomainError> {
        self.run("LLEN", |mut conn| async move { conn.llen(queue).await })
            .await
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let _: String = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
