//! Bounded candidate queue
//!
//! The ingest side never waits: when the queue is full the configured
//! drop policy decides which candidate is lost, and the loss is counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DropPolicy;
use crate::types::Candidate;

/// What happened to a pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full, the incoming item was refused
    DroppedNewest,
    /// Queue full, the head was evicted to make room
    DroppedOldest,
}

impl PushOutcome {
    pub fn dropped(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

/// FIFO with a hard capacity and a drop counter
pub struct BoundedQueue<T> {
    capacity: usize,
    drop_policy: DropPolicy,
    buffer: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

pub type CandidateQueue = BoundedQueue<Candidate>;
pub type SharedCandidateQueue = Arc<CandidateQueue>;

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            drop_policy,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Never blocks
    pub fn push(&self, item: T) -> PushOutcome {
        let mut buffer = self.buffer();
        let outcome = if buffer.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.drop_policy {
                DropPolicy::Newest => {
                    debug!("Queue full ({}), dropped incoming item", self.capacity);
                    return PushOutcome::DroppedNewest;
                }
                DropPolicy::Oldest => {
                    buffer.pop_front();
                    debug!("Queue full ({}), evicted oldest item", self.capacity);
                    PushOutcome::DroppedOldest
                }
            }
        } else {
            PushOutcome::Queued
        };
        buffer.push_back(item);
        drop(buffer);
        self.notify.notify_one();
        outcome
    }

    /// Next item in arrival order, or `None` once `shutdown` fires
    pub async fn pop(&self, shutdown: &CancellationToken) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.buffer().pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items lost to the drop policy so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
