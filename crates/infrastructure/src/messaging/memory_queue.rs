use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use domain::DomainError;
use domain::broker::QueueTransport;

/// In-process broker used by tests and local runs without Redis.
///
/// The link can be toggled offline to exercise buffering and retry paths.
#[derive(Debug)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    online: AtomicBool,
    pushes: AtomicUsize,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            pushes: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Snapshot of a queue's contents, head first
    pub fn contents(&self, queue: &str) -> Vec<String> {
        self.lock()
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), DomainError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DomainError::Transport("in-memory broker offline".to_string()))
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<(), DomainError> {
        self.check_online()?;
        self.lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>, DomainError> {
        self.check_online()?;
        let mut queues = self.lock();
        let Some(q) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let n = max.min(q.len());
        Ok(q.drain(..n).collect())
    }

    async fn depth(&self, queue: &str) -> Result<usize, DomainError> {
        self.check_online()?;
        Ok(self.lock().get(queue).map(VecDeque::len).unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        self.check_online()
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_batches() {
        let queue = InMemoryQueue::new();
        for i in 0..5 {
            queue.push("q", format!("m{i}")).await.unwrap();
        }
        assert_eq!(queue.pop_batch("q", 3).await.unwrap(), vec!["m0", "m1", "m2"]);
        assert_eq!(queue.depth("q").await.unwrap(), 2);
        assert_eq!(queue.pop_batch("q", 10).await.unwrap(), vec!["m3", "m4"]);
        assert!(queue.pop_batch("q", 10).await.unwrap().is_empty());
        assert!(queue.pop_batch("missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_rejects_operations() {
        let queue = InMemoryQueue::new();
        queue.set_online(false);
        assert!(!queue.is_connected());
        assert!(matches!(
            queue.push("q", "x".into()).await,
            Err(DomainError::Transport(_))
        ));
        assert!(queue.ping().await.is_err());
        queue.set_online(true);
        assert!(queue.ping().await.is_ok());
    }
}
