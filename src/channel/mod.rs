//! Two-stage channel core.
//!
//! The producer-facing `Channel<T>` handle, the single reader task, and the
//! export worker pool. See [`crate::channel::options`] for construction
//! parameters and observability hooks.

mod inner;
pub mod options;
mod reader;
mod worker;

pub use options::{ChannelOptions, ChannelOptionsBuilder, ExportOutcome, FullMode};

use crate::buffer::ArrayPool;
use crate::document::RoutingAccessor;
use crate::routing::RoutingStrategy;
use crate::serializer::DocumentSerializer;
use crate::transport::Transport;
use inner::ChannelInner;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::info;
use worker::WorkerContext;

/// A running buffered ingest channel. Cloning is cheap (an `Arc` + a channel
/// `Sender`) and all clones share the same reader/worker pool.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
    inbound_tx: mpsc::Sender<T>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            inbound_tx: self.inbound_tx.clone(),
        }
    }
}

/// Construct and start a channel: spawns the reader task and the
/// `export_max_concurrency`-sized worker pool.
pub fn open<T, S>(
    transport: Arc<dyn Transport>,
    strategy: RoutingStrategy,
    serializer: S,
    channel_fingerprint: impl Into<String>,
    options: ChannelOptions<T>,
) -> Channel<T>
where
    T: RoutingAccessor + Send + Sync + 'static,
    S: DocumentSerializer<T> + Send + Sync + 'static,
{
    let inbound_max = options.inbound_max_size.max(1);
    let concurrency = options.resolved_concurrency().max(1);
    let pool = Arc::new(ArrayPool::new(options.outbound_max_size));

    let (inbound_tx, inbound_rx) = mpsc::channel(inbound_max);
    let (outbound_tx, outbound_rx) = mpsc::channel(concurrency * 4);

    let inner = Arc::new(ChannelInner {
        options,
        complete_token: CancellationToken::new(),
        reader_buffered: AtomicUsize::new(0),
        outbound_queue_depth: AtomicUsize::new(0),
        inflight_workers: AtomicUsize::new(0),
        drain_notify: Notify::new(),
    });

    tokio::spawn(reader::run_reader(
        inner.clone(),
        inbound_rx,
        outbound_tx,
        pool,
    ));

    let outbound_rx = Arc::new(AsyncMutex::new(outbound_rx));
    let ctx = Arc::new(WorkerContext {
        inner: inner.clone(),
        transport,
        strategy,
        serializer: Arc::new(serializer),
        channel_fingerprint: channel_fingerprint.into(),
    });

    info!(concurrency, "starting export worker pool");
    for _ in 0..concurrency {
        tokio::spawn(worker::run_worker(ctx.clone(), outbound_rx.clone()));
    }

    Channel { inner, inbound_tx }
}

impl<T: Send + 'static> Channel<T> {
    /// Non-blocking write. Returns `false` iff inbound is full and
    /// `full_mode == DropWrite` (invoking `buffer_item_dropped`), or the
    /// channel is closed.
    pub fn try_write(&self, doc: T) -> bool {
        if self.inner.is_complete() {
            return false;
        }
        match self.inbound_tx.try_send(doc) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(doc)) => {
                if self.inner.options.full_mode == FullMode::DropWrite {
                    if let Some(hook) = &self.inner.options.buffer_item_dropped {
                        hook(&doc);
                    }
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Batch variant of [`Channel::try_write`]; same semantics element-wise.
    pub fn try_write_many(&self, docs: Vec<T>) -> Vec<bool> {
        docs.into_iter().map(|d| self.try_write(d)).collect()
    }

    /// Blocks until there is space or `cancel` fires. In `full_mode == Wait`,
    /// applies an incremental delay (up to 1s) as pending nears
    /// `inbound_max_size - drain_size` to slow producers ahead of time.
    pub async fn wait_to_write_async(&self, doc: T, cancel: &CancellationToken) -> bool {
        if self.inner.is_complete() {
            return false;
        }
        self.apply_adaptive_delay(cancel).await;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.inner.complete_token.cancelled() => false,
            res = self.inbound_tx.send(doc) => res.is_ok(),
        }
    }

    /// Batch variant of [`Channel::wait_to_write_async`].
    pub async fn wait_to_write_many_async(&self, docs: Vec<T>, cancel: &CancellationToken) -> Vec<bool> {
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            out.push(self.wait_to_write_async(doc, cancel).await);
        }
        out
    }

    /// Closes inbound; further writes return `false`. Idempotent.
    pub fn try_complete(&self) {
        self.inner.complete_token.cancel();
    }

    /// Blocks until inbound is empty, outbound is empty, and no worker is
    /// in-flight, or `max_wait` elapses. A `None` deadline scales with the
    /// number of pending outbound batches. Returns `false` on timeout or on
    /// `cancel` firing (which does *not* close inbound).
    pub async fn wait_for_drain_async(
        &self,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> bool {
        let pending_batches = self.inner.outbound_queue_depth.load(Ordering::Relaxed)
            + self.inner.inflight_workers.load(Ordering::Relaxed);
        let deadline =
            max_wait.unwrap_or_else(|| Duration::from_secs(5) + Duration::from_millis(500 * pending_batches as u64));

        let wait_loop = async {
            loop {
                let depth = self.inbound_depth();
                if self.inner.is_drained(depth) {
                    return true;
                }
                tokio::select! {
                    _ = self.inner.drain_notify.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = tokio::time::timeout(deadline, wait_loop) => result.unwrap_or(false),
        }
    }

    fn inbound_depth(&self) -> usize {
        self.inner
            .options
            .inbound_max_size
            .saturating_sub(self.inbound_tx.capacity())
    }

    async fn apply_adaptive_delay(&self, cancel: &CancellationToken) {
        if self.inner.options.full_mode != FullMode::Wait {
            return;
        }
        let drain_size = self.inner.options.resolved_drain_size();
        if drain_size == 0 {
            return;
        }
        let threshold = self.inner.options.inbound_max_size.saturating_sub(drain_size);
        let depth = self.inbound_depth();
        if depth <= threshold {
            return;
        }
        let over = depth - threshold;
        let delay_ms = ((over as u64) * 1000 / drain_size as u64).min(1000);
        if delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
    }
}
