//! Shared state between the reader task, worker tasks, and producer-facing handles.

use super::options::ChannelOptions;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub struct ChannelInner<T> {
    pub options: ChannelOptions<T>,
    /// Cancelled by `try_complete`; also observed by the reader to stop
    /// accepting new inbound items once drained.
    pub complete_token: CancellationToken,
    /// Items currently sitting in the reader's own (not-yet-flushed) buffer.
    pub reader_buffered: AtomicUsize,
    /// Outbound buffers posted but not yet picked up by a worker.
    pub outbound_queue_depth: AtomicUsize,
    /// Workers currently mid-export (including retries).
    pub inflight_workers: AtomicUsize,
    pub drain_notify: Notify,
}

impl<T> ChannelInner<T> {
    pub fn is_complete(&self) -> bool {
        self.complete_token.is_cancelled()
    }

    pub fn is_drained(&self, inbound_channel_depth: usize) -> bool {
        inbound_channel_depth == 0
            && self.reader_buffered.load(std::sync::atomic::Ordering::Relaxed) == 0
            && self.outbound_queue_depth.load(std::sync::atomic::Ordering::Relaxed) == 0
            && self.inflight_workers.load(std::sync::atomic::Ordering::Relaxed) == 0
    }
}
