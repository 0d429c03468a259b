//! End-to-end scenarios against the public `Channel<T>` API, using the
//! in-memory `MockTransport` fake instead of a live Elasticsearch cluster.

mod common;

use bulkchan::routing::{IndexRouting, RoutingStrategy};
use bulkchan::{Channel, ChannelOptions, ExportOutcome, FullMode, ReflectiveSerializer, RoutingAccessor};
use common::{MockTransport, Script};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Serialize, Clone)]
struct Order {
    id: String,
    total_cents: u32,
}

impl RoutingAccessor for Order {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

struct Outcomes {
    accepted: Mutex<Vec<String>>,
    rejected: Mutex<Vec<(String, String)>>,
    exhausted: Mutex<Vec<String>>,
    dropped: AtomicUsize,
}

impl Outcomes {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            accepted: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
            exhausted: Mutex::new(Vec::new()),
            dropped: AtomicUsize::new(0),
        })
    }
}

fn options_with_hooks(outcomes: Arc<Outcomes>) -> ChannelOptions<Order> {
    let export_hook_outcomes = outcomes.clone();
    let drop_hook_outcomes = outcomes;

    ChannelOptions::builder()
        .inbound_max_size(64)
        .outbound_max_size(8)
        .outbound_max_lifetime(Duration::from_millis(50))
        .export_max_retries(2)
        .export_backoff(Arc::new(|_attempt| Duration::from_millis(5)))
        .export_response(Arc::new(move |doc: &Order, outcome| match outcome {
            ExportOutcome::Accepted => export_hook_outcomes.accepted.lock().unwrap().push(doc.id.clone()),
            ExportOutcome::Rejected { reason, .. } => export_hook_outcomes
                .rejected
                .lock()
                .unwrap()
                .push((doc.id.clone(), reason)),
            ExportOutcome::RetryExhausted => {
                export_hook_outcomes.exhausted.lock().unwrap().push(doc.id.clone())
            }
        }))
        .buffer_item_dropped(Arc::new(move |_doc: &Order| {
            drop_hook_outcomes.dropped.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
}

#[tokio::test]
async fn writes_drain_and_report_accepted() {
    let transport = MockTransport::new(vec![Script::AllAccepted]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-a",
        options_with_hooks(outcomes.clone()),
    );

    for i in 0..5 {
        assert!(channel.try_write(Order {
            id: uuid::Uuid::new_v4().to_string(),
            total_cents: 100 * i,
        }));
    }

    channel.try_complete();
    let cancel = CancellationToken::new();
    assert!(channel.wait_for_drain_async(Some(Duration::from_secs(2)), &cancel).await);

    let accepted = outcomes.accepted.lock().unwrap();
    assert_eq!(accepted.len(), 5);
}

#[tokio::test]
async fn throttle_retries_whole_batch_then_succeeds() {
    let transport = MockTransport::new(vec![Script::Throttled, Script::AllAccepted]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-b",
        options_with_hooks(outcomes.clone()),
    );

    for i in 0..3 {
        channel.try_write(Order {
            id: format!("t-{i}"),
            total_cents: 1,
        });
    }
    channel.try_complete();
    let cancel = CancellationToken::new();
    assert!(channel.wait_for_drain_async(Some(Duration::from_secs(2)), &cancel).await);

    assert_eq!(outcomes.accepted.lock().unwrap().len(), 3);
    assert!(outcomes.exhausted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn server_5xx_retries_only_failed_items_until_exhausted() {
    // Every attempt (first + both retries) returns a per-item 503; after
    // export_max_retries = 2, the items are reported RetryExhausted, never
    // RejectItem (5xx is per-item retry, not per-item reject).
    let transport = MockTransport::new(vec![
        Script::AllServerError,
        Script::AllServerError,
        Script::AllServerError,
    ]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-c",
        options_with_hooks(outcomes.clone()),
    );

    channel.try_write(Order {
        id: "e-1".to_string(),
        total_cents: 1,
    });
    channel.try_complete();
    let cancel = CancellationToken::new();
    assert!(channel.wait_for_drain_async(Some(Duration::from_secs(2)), &cancel).await);

    assert!(outcomes.accepted.lock().unwrap().is_empty());
    assert!(outcomes.rejected.lock().unwrap().is_empty());
    assert_eq!(outcomes.exhausted.lock().unwrap(), &vec!["e-1".to_string()]);
}

#[tokio::test]
async fn non_retryable_status_rejects_item_immediately() {
    let transport = MockTransport::new(vec![Script::AllRejected]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-d",
        options_with_hooks(outcomes.clone()),
    );

    channel.try_write(Order {
        id: "r-1".to_string(),
        total_cents: 1,
    });
    channel.try_complete();
    let cancel = CancellationToken::new();
    assert!(channel.wait_for_drain_async(Some(Duration::from_secs(2)), &cancel).await);

    let rejected = outcomes.rejected.lock().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].0, "r-1");
    assert_eq!(rejected[0].1, "mapper_parsing_exception");
}

#[tokio::test]
async fn drop_write_mode_drops_on_full_queue_without_blocking() {
    let transport = MockTransport::new(vec![]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let options = bulkchan::ChannelOptions::builder()
        .inbound_max_size(1)
        .outbound_max_size(1)
        .outbound_max_lifetime(Duration::from_secs(10))
        .full_mode(FullMode::DropWrite)
        .buffer_item_dropped(Arc::new({
            let outcomes = outcomes.clone();
            move |_doc: &Order| {
                outcomes.dropped.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .build();

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-e",
        options,
    );

    let mut accepted_count = 0;
    let mut dropped_count = 0;
    for i in 0..50 {
        if channel.try_write(Order {
            id: format!("d-{i}"),
            total_cents: 1,
        }) {
            accepted_count += 1;
        } else {
            dropped_count += 1;
        }
    }

    assert!(accepted_count > 0);
    // Not every write can have been dropped since the queue starts empty.
    assert!(accepted_count + dropped_count == 50);
}

#[tokio::test]
async fn single_worker_drains_batches_in_arrival_order() {
    let transport = MockTransport::new(vec![]);
    let outcomes = Outcomes::new();
    let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));

    let options = bulkchan::ChannelOptions::builder()
        .inbound_max_size(100)
        .outbound_max_size(1)
        .outbound_max_lifetime(Duration::from_millis(20))
        .export_max_concurrency(Some(1))
        .export_response(Arc::new({
            let outcomes = outcomes.clone();
            move |doc: &Order, outcome| {
                if let ExportOutcome::Accepted = outcome {
                    outcomes.accepted.lock().unwrap().push(doc.id.clone());
                }
            }
        }))
        .build();

    let channel: Channel<Order> = bulkchan::open(
        transport.clone(),
        strategy,
        ReflectiveSerializer,
        "fingerprint-f",
        options,
    );

    for i in 0..10 {
        channel.try_write(Order {
            id: format!("s-{i}"),
            total_cents: 1,
        });
    }
    channel.try_complete();
    let cancel = CancellationToken::new();
    assert!(channel.wait_for_drain_async(Some(Duration::from_secs(2)), &cancel).await);

    let accepted = outcomes.accepted.lock().unwrap();
    let expected: Vec<String> = (0..10).map(|i| format!("s-{i}")).collect();
    assert_eq!(*accepted, expected);
}
