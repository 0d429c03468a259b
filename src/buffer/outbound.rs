//! Outbound buffer.
//!
//! An immutable snapshot of a flushed inbound buffer. Owned exclusively by
//! whichever worker drains it; release returns the array to the pool.

use super::pool::ArrayPool;
use std::sync::Arc;
use std::time::Instant;

pub struct OutboundBuffer<T> {
    array: Vec<T>,
    pub first_write: Option<Instant>,
    pool: Arc<ArrayPool<T>>,
}

impl<T> OutboundBuffer<T> {
    pub fn new(array: Vec<T>, first_write: Option<Instant>, pool: Arc<ArrayPool<T>>) -> Self {
        Self {
            array,
            first_write,
            pool,
        }
    }

    pub fn count(&self) -> usize {
        self.array.len()
    }

    pub fn slice(&self) -> &[T] {
        &self.array
    }

    /// Release the array back to the pool when every item is done (accepted,
    /// rejected, or drained off into a retry subset).
    pub fn release(self) {
        self.pool.release(self.array);
    }

    /// Move the items at `indices` (ascending, 0-based into this buffer) out as
    /// an owned `Vec`, preserving their relative order (retried items must stay
    /// in submission order). The remaining items are dropped; the backing array
    /// is not returned to the pool since ownership of its elements has been split.
    pub fn take_indices(self, indices: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(indices.len());
        let mut wanted = indices.iter().peekable();
        for (i, item) in self.array.into_iter().enumerate() {
            if wanted.peek() == Some(&&i) {
                out.push(item);
                wanted.next();
            }
        }
        out
    }
}
