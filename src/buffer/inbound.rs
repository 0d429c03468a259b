//! Inbound buffer.
//!
//! Owned exclusively by the reader loop; not thread-safe by contract (only one
//! task ever touches it).

use super::pool::ArrayPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct InboundBuffer<T> {
    pool: Arc<ArrayPool<T>>,
    items: Vec<T>,
    max_size: usize,
    force_flush_after: Duration,
    first_write: Option<Instant>,
    first_wait_to_read: Option<Instant>,
}

impl<T> InboundBuffer<T> {
    pub fn new(pool: Arc<ArrayPool<T>>, max_size: usize, force_flush_after: Duration) -> Self {
        let items = pool.rent();
        Self {
            pool,
            items,
            max_size,
            force_flush_after,
            first_write: None,
            first_wait_to_read: None,
        }
    }

    pub fn add(&mut self, item: T) {
        if self.first_write.is_none() {
            self.first_write = Some(Instant::now());
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records that the reader just started waiting for the next inbound item
    /// with this buffer still non-empty. The time-based flush deadline is
    /// measured from here, not from `first_write`, so a buffer that has been
    /// sitting idle since the last flush doesn't appear overdue the instant a
    /// new item arrives.
    pub fn mark_wait_to_read(&mut self) {
        if self.first_wait_to_read.is_none() && !self.items.is_empty() {
            self.first_wait_to_read = Some(Instant::now());
        }
    }

    pub fn thresholds_hit(&self) -> bool {
        if self.items.len() >= self.max_size {
            return true;
        }
        match self.first_wait_to_read {
            Some(t) => t.elapsed() > self.force_flush_after,
            None => false,
        }
    }

    /// Remaining time until the time-based flush deadline fires, measured from
    /// `first_wait_to_read`. `None` when the buffer is empty (nothing to flush).
    pub fn deadline_remaining(&self) -> Option<Duration> {
        if self.items.is_empty() {
            return None;
        }
        let started = self.first_wait_to_read?;
        Some(
            self.force_flush_after
                .saturating_sub(started.elapsed()),
        )
    }

    /// Swap the buffer out for a fresh, pooled array, returning the filled one
    /// plus its first-write timestamp as an explicit ownership move.
    pub fn reset(&mut self) -> (Vec<T>, Option<Instant>) {
        let filled = std::mem::replace(&mut self.items, self.pool.rent());
        let first_write = self.first_write.take();
        self.first_wait_to_read = None;
        (filled, first_write)
    }
}
