//! The single reader task.
//!
//! Pulls items off the inbound `mpsc` channel into an [`InboundBuffer`], and on
//! a size-or-time threshold swaps the buffer into an [`OutboundBuffer`] posted
//! to the outbound queue. Uses one cached `Sleep` future re-armed in place
//! rather than recreated every iteration, so a deadline wait never leaks a
//! subscription across loop turns.

use super::inner::ChannelInner;
use crate::buffer::{ArrayPool, InboundBuffer, OutboundBuffer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tracing::{debug, trace};

pub async fn run_reader<T: Send + 'static>(
    inner: Arc<ChannelInner<T>>,
    mut inbound_rx: mpsc::Receiver<T>,
    outbound_tx: mpsc::Sender<OutboundBuffer<T>>,
    pool: Arc<ArrayPool<T>>,
) {
    let mut buffer = InboundBuffer::new(
        pool.clone(),
        inner.options.outbound_max_size,
        inner.options.outbound_max_lifetime,
    );

    let mut sleep_fut: std::pin::Pin<Box<Sleep>> = Box::pin(sleep(Duration::from_secs(3600)));
    let mut sleep_armed = false;
    let mut complete_requested = false;

    loop {
        inner.reader_buffered.store(buffer.len(), Ordering::Relaxed);
        buffer.mark_wait_to_read();

        if let Some(remaining) = buffer.deadline_remaining() {
            sleep_fut.as_mut().reset(tokio::time::Instant::now() + remaining);
            sleep_armed = true;
        } else {
            sleep_armed = false;
        }

        tokio::select! {
            biased;

            _ = inner.complete_token.cancelled(), if !complete_requested => {
                complete_requested = true;
                inbound_rx.close();
            }

            maybe_item = inbound_rx.recv() => {
                match maybe_item {
                    Some(item) => {
                        buffer.add(item);
                        inner.reader_buffered.store(buffer.len(), Ordering::Relaxed);
                        if buffer.thresholds_hit() {
                            flush(&inner, &mut buffer, &outbound_tx, pool.clone()).await;
                        }
                    }
                    None => {
                        // Inbound channel drained after a close: flush whatever
                        // is left and stop.
                        if !buffer.is_empty() {
                            flush(&inner, &mut buffer, &outbound_tx, pool.clone()).await;
                        }
                        break;
                    }
                }
            }

            _ = &mut sleep_fut, if sleep_armed => {
                // Waking on the time deadline with an empty buffer is a no-op.
                if buffer.thresholds_hit() {
                    flush(&inner, &mut buffer, &outbound_tx, pool.clone()).await;
                }
            }
        }
    }

    debug!("reader loop exited");
}

async fn flush<T: Send + 'static>(
    inner: &Arc<ChannelInner<T>>,
    buffer: &mut InboundBuffer<T>,
    outbound_tx: &mpsc::Sender<OutboundBuffer<T>>,
    pool: Arc<ArrayPool<T>>,
) {
    let (items, first_write) = buffer.reset();
    let count = items.len();
    if count == 0 {
        return;
    }
    trace!(count, "flushing inbound buffer to outbound queue");
    let outbound = OutboundBuffer::new(items, first_write, pool);

    inner.outbound_queue_depth.fetch_add(1, Ordering::SeqCst);
    inner.reader_buffered.store(0, Ordering::Relaxed);

    if let Some(hook) = &inner.options.publish_to_outbound {
        hook(count);
    }

    // This send is the sole backpressure mechanism from workers to producers:
    // if every worker is busy and the outbound queue (capacity
    // `export_max_concurrency * 4`) is full, the reader blocks here, which in
    // turn stops draining the inbound queue.
    if outbound_tx.send(outbound).await.is_err() {
        // All workers gone; nothing left to do but drop the batch.
        inner.outbound_queue_depth.fetch_sub(1, Ordering::SeqCst);
    }
}
