//! The export worker pool.
//!
//! Each worker repeatedly drains the shared outbound queue, builds a bulk
//! request, sends it, classifies the response, and retries whatever the
//! interpreter marked retryable up to `export_max_retries` attempts. Workers
//! share one `mpsc::Receiver` behind a `Mutex` — a common pattern for fanning
//! a single-consumer channel out to an N-worker pool without a dedicated MPMC
//! crate.

use super::inner::ChannelInner;
use super::options::ExportOutcome;
use crate::bulk_request::{self, BuiltBulkRequest};
use crate::buffer::OutboundBuffer;
use crate::document::RoutingAccessor;
use crate::response::{self, ItemOutcome};
use crate::routing::RoutingStrategy;
use crate::serializer::DocumentSerializer;
use crate::transport::{Method, Transport};
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

pub struct WorkerContext<T, S> {
    pub inner: Arc<ChannelInner<T>>,
    pub transport: Arc<dyn Transport>,
    pub strategy: RoutingStrategy,
    pub serializer: Arc<S>,
    pub channel_fingerprint: String,
}

impl<T, S> WorkerContext<T, S>
where
    T: RoutingAccessor + Send + Sync + 'static,
    S: DocumentSerializer<T> + Send + Sync + 'static,
{
    fn report(&self, item: &T, outcome: ExportOutcome) {
        if let Some(hook) = &self.inner.options.export_response {
            hook(item, outcome);
        }
    }

    /// Build, send, and classify one attempt over `items`. Reports terminal
    /// outcomes (accepted/rejected, including serialization failures) via the
    /// hook immediately and returns the indices (into `items`) that still need
    /// a retry, in ascending order.
    async fn attempt(&self, items: &[T]) -> Vec<usize> {
        let mut scratch = Vec::new();
        let built: BuiltBulkRequest = bulk_request::build(
            items,
            &self.strategy,
            self.serializer.as_ref(),
            &mut scratch,
            &self.channel_fingerprint,
            Utc::now(),
        );

        for (idx, err) in &built.immediate_rejections {
            self.report(
                &items[*idx],
                ExportOutcome::Rejected {
                    status: 0,
                    reason: err.to_string(),
                },
            );
        }

        if built.submitted.is_empty() {
            return Vec::new();
        }

        let send_result = self
            .transport
            .request(
                Method::Post,
                &built.url,
                Some(Bytes::from(built.body)),
                "application/x-ndjson",
            )
            .await;

        let item_outcomes = match &send_result {
            Ok(resp) => response::classify(resp, built.submitted.len()).items,
            Err(e) => {
                warn!(error = %e, "bulk request transport failure, retrying whole batch");
                std::iter::repeat_with(|| ItemOutcome::RetryItem)
                    .take(built.submitted.len())
                    .collect()
            }
        };

        let mut retry_indices = Vec::new();
        for (pos, outcome) in item_outcomes.into_iter().enumerate() {
            let original_idx = built.submitted[pos];
            match outcome {
                ItemOutcome::Accepted => self.report(&items[original_idx], ExportOutcome::Accepted),
                ItemOutcome::RejectItem { status, reason } => {
                    self.report(&items[original_idx], ExportOutcome::Rejected { status, reason })
                }
                ItemOutcome::RetryItem | ItemOutcome::RetryEntireBatch => {
                    retry_indices.push(original_idx)
                }
            }
        }
        retry_indices
    }
}

fn select_indices<T>(items: Vec<T>, keep: &[usize]) -> Vec<T> {
    let mut keep_iter = keep.iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if keep_iter.peek() == Some(&&i) {
                keep_iter.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

pub async fn run_worker<T, S>(
    ctx: Arc<WorkerContext<T, S>>,
    outbound_rx: Arc<AsyncMutex<mpsc::Receiver<OutboundBuffer<T>>>>,
) where
    T: RoutingAccessor + Send + Sync + 'static,
    S: DocumentSerializer<T> + Send + Sync + 'static,
{
    loop {
        let buf = {
            let mut rx = outbound_rx.lock().await;
            rx.recv().await
        };
        let Some(buf) = buf else { break };

        ctx.inner.outbound_queue_depth.fetch_sub(1, Ordering::SeqCst);
        ctx.inner.inflight_workers.fetch_add(1, Ordering::SeqCst);

        process_batch(&ctx, buf).await;

        ctx.inner.inflight_workers.fetch_sub(1, Ordering::SeqCst);
        ctx.inner.drain_notify.notify_waiters();
    }
    debug!("worker exited");
}

async fn process_batch<T, S>(ctx: &Arc<WorkerContext<T, S>>, buf: OutboundBuffer<T>)
where
    T: RoutingAccessor + Send + Sync + 'static,
    S: DocumentSerializer<T> + Send + Sync + 'static,
{
    let count = buf.count();
    let retry_indices = ctx.attempt(buf.slice()).await;

    let mut pending = if retry_indices.is_empty() {
        buf.release();
        Vec::new()
    } else {
        buf.take_indices(&retry_indices)
    };

    let mut attempt: u32 = 1;
    let mut exhausted = 0usize;
    while !pending.is_empty() {
        if attempt > ctx.inner.options.export_max_retries {
            for item in &pending {
                ctx.report(item, ExportOutcome::RetryExhausted);
            }
            exhausted = pending.len();
            break;
        }
        tokio::time::sleep((ctx.inner.options.export_backoff)(attempt - 1)).await;
        let retry_indices = ctx.attempt(&pending).await;
        pending = if retry_indices.is_empty() {
            Vec::new()
        } else {
            select_indices(pending, &retry_indices)
        };
        attempt += 1;
    }

    if let Some(hook) = &ctx.inner.options.outbound_exited {
        hook(count.saturating_sub(exhausted), exhausted);
    }
}
