//! FramePipeline - Bounded capture -> inference queue
//!
//! ## Responsibilities
//!
//! - `push` never blocks: when full the oldest frame is evicted
//! - `pop` waits up to a timeout so the consumer can re-check shutdown
//! - The lock is never held across an await

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Drop-oldest bounded queue shared by exactly one producer and one consumer
pub struct FrameQueue<T> {
    slots: Mutex<VecDeque<T>>,
    capacity: usize,
    ready: Notify,
    evicted: AtomicU64,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            evicted: AtomicU64::new(0),
        }
    }

    /// Insert `item`, evicting and returning the oldest item if full
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut slots = self.lock();
            let evicted = if slots.len() >= self.capacity {
                slots.pop_front()
            } else {
                None
            };
            slots.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(capacity = self.capacity, "Queue full, replaced oldest frame");
        }
        self.ready.notify_one();
        evicted
    }

    /// Take the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Take the oldest item, waiting at most `timeout` for one to arrive
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames discarded by the overflow policy
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
