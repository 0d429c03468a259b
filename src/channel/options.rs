//! Construction parameters and observability hooks.
//!
//! Hooks are modelled as `Option<Arc<dyn Fn(...) + Send + Sync>>` fields — zero
//! cost when unset. The builder mirrors the `derive_builder` pattern this
//! ecosystem uses for Elasticsearch request options.

use derive_builder::Builder;
use std::sync::Arc;
use std::time::Duration;

/// Behavior when the inbound queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullMode {
    /// `wait_to_write_async` blocks (with adaptive delay as `drain_size` nears);
    /// `try_write` returns `false` without blocking.
    Wait,
    /// Both write methods return `false` immediately and invoke `buffer_item_dropped`.
    DropWrite,
}

/// The final disposition of one document handed to `export_response`.
#[derive(Debug, Clone)]
pub enum ExportOutcome {
    Accepted,
    Rejected { status: u16, reason: String },
    RetryExhausted,
}

pub type DropHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type PublishHook = Arc<dyn Fn(usize) + Send + Sync>;
pub type OutboundExitHook = Arc<dyn Fn(usize, usize) + Send + Sync>;
pub type ExportResponseHook<T> = Arc<dyn Fn(&T, ExportOutcome) + Send + Sync>;
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Default backoff: `2 * (attempt + 1)` seconds.
pub fn default_backoff() -> BackoffFn {
    Arc::new(|attempt: u32| Duration::from_secs(2 * (attempt as u64 + 1)))
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(skip))]
pub struct ChannelOptions<T> {
    #[builder(default = "100_000")]
    pub inbound_max_size: usize,
    #[builder(default = "1_000")]
    pub outbound_max_size: usize,
    #[builder(default = "Duration::from_secs(5)")]
    pub outbound_max_lifetime: Duration,
    #[builder(default)]
    pub export_max_concurrency: Option<usize>,
    #[builder(default = "3")]
    pub export_max_retries: u32,
    #[builder(default = "default_backoff()")]
    pub export_backoff: BackoffFn,
    #[builder(default = "FullMode::Wait")]
    pub full_mode: FullMode,
    #[builder(default)]
    pub drain_size: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub buffer_item_dropped: Option<DropHook<T>>,
    #[builder(default, setter(strip_option))]
    pub publish_to_outbound: Option<PublishHook>,
    #[builder(default, setter(strip_option))]
    pub outbound_exited: Option<OutboundExitHook>,
    #[builder(default, setter(strip_option))]
    pub export_response: Option<ExportResponseHook<T>>,
}

impl<T> ChannelOptionsBuilder<T> {
    pub fn build(self) -> ChannelOptions<T> {
        let inbound_max_size = self.inbound_max_size.unwrap_or(100_000);
        let outbound_max_size = self.outbound_max_size.unwrap_or(1_000);
        let export_max_concurrency = self.export_max_concurrency.flatten().unwrap_or_else(|| {
            let processors = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            let by_ratio = inbound_max_size.div_ceil(outbound_max_size.max(1));
            by_ratio.min(2 * processors).max(1)
        });
        let drain_size = self
            .drain_size
            .flatten()
            .unwrap_or_else(|| inbound_max_size / 10);

        ChannelOptions {
            inbound_max_size,
            outbound_max_size,
            outbound_max_lifetime: self
                .outbound_max_lifetime
                .unwrap_or_else(|| Duration::from_secs(5)),
            export_max_concurrency: Some(export_max_concurrency),
            export_max_retries: self.export_max_retries.unwrap_or(3),
            export_backoff: self.export_backoff.unwrap_or_else(default_backoff),
            full_mode: self.full_mode.unwrap_or(FullMode::Wait),
            drain_size: Some(drain_size),
            buffer_item_dropped: self.buffer_item_dropped.flatten(),
            publish_to_outbound: self.publish_to_outbound.flatten(),
            outbound_exited: self.outbound_exited.flatten(),
            export_response: self.export_response.flatten(),
        }
    }
}

impl<T> ChannelOptions<T> {
    pub fn builder() -> ChannelOptionsBuilder<T> {
        ChannelOptionsBuilder::default()
    }

    pub fn resolved_concurrency(&self) -> usize {
        self.export_max_concurrency.unwrap_or(1)
    }

    pub fn resolved_drain_size(&self) -> usize {
        self.drain_size.unwrap_or(self.inbound_max_size / 10)
    }
}

impl<T> Default for ChannelOptions<T> {
    fn default() -> Self {
        ChannelOptionsBuilder::default().build()
    }
}
