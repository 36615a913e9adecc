use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::config::OverflowPolicy;

/// An envelope waiting for the broker to come back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEnvelope {
    pub seq: u64,
    pub queue: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPush {
    Accepted { depth: usize },
    /// Accepted after evicting the oldest entry
    Evicted { depth: usize },
    Rejected { depth: usize },
}

#[derive(Debug, Default)]
struct BufferState {
    entries: VecDeque<PendingEnvelope>,
    next_seq: u64,
}

/// Bounded FIFO for envelopes that could not be pushed.
///
/// Single drainer: the flusher peeks the head, pushes it, then acks it by
/// sequence number so an eviction in between cannot drop the wrong entry.
#[derive(Debug)]
pub struct OfflineBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OfflineBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            capacity: capacity.max(1),
            policy,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, queue: String, payload: String) -> BufferPush {
        let mut state = self.lock();
        let mut evicted = false;

        if state.entries.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::RejectNewest => {
                    return BufferPush::Rejected {
                        depth: state.entries.len(),
                    };
                }
                OverflowPolicy::DropOldest => {
                    state.entries.pop_front();
                    evicted = true;
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push_back(PendingEnvelope {
            seq,
            queue,
            payload,
        });

        let depth = state.entries.len();
        if evicted {
            BufferPush::Evicted { depth }
        } else {
            BufferPush::Accepted { depth }
        }
    }

    pub fn peek(&self) -> Option<PendingEnvelope> {
        self.lock().entries.front().cloned()
    }

    /// Removes the head if it is still the entry with `seq`
    pub fn ack(&self, seq: u64) -> bool {
        let mut state = self.lock();
        if state.entries.front().is_some_and(|e| e.seq == seq) {
            state.entries.pop_front();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
