//! Bootstrap sequencer scenarios: fingerprint short-circuit and friends.

mod common;

use async_trait::async_trait;
use bulkchan::bootstrap::{self, BootstrapContext, BootstrapPolicy, InferenceOptions};
use bulkchan::{ChannelError, Method, Transport, TransportResponse};
use bytes::Bytes;
use common::MockTransport;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A fake Elasticsearch that remembers whatever template/component template
/// bodies were PUT, so GET reflects real state across bootstrap calls.
struct StatefulTransport {
    templates: Mutex<std::collections::HashMap<String, Value>>,
    put_count: AtomicUsize,
}

impl StatefulTransport {
    fn new() -> Arc<Self> {
        common::init_tracing();
        Arc::new(Self {
            templates: Mutex::new(std::collections::HashMap::new()),
            put_count: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for StatefulTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        _content_type: &'static str,
    ) -> Result<TransportResponse, ChannelError> {
        let mut templates = self.templates.lock().await;
        match method {
            Method::Put => {
                if path.starts_with("/_index_template/") {
                    self.put_count.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(body) = body {
                    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                    templates.insert(path.to_string(), parsed);
                }
                Ok(TransportResponse {
                    status: 200,
                    body: Bytes::from_static(b"{}"),
                })
            }
            Method::Get => {
                if path == "/_index_template/orders" {
                    if let Some(stored) = templates.get(path) {
                        let hash = stored.pointer("/template/_meta/hash").cloned().unwrap_or(Value::Null);
                        return Ok(TransportResponse {
                            status: 200,
                            body: Bytes::from(
                                json!({
                                    "index_templates": [
                                        { "index_template": { "_meta": { "hash": hash } } }
                                    ]
                                })
                                .to_string(),
                            ),
                        });
                    }
                    return Ok(TransportResponse {
                        status: 404,
                        body: Bytes::new(),
                    });
                }
                Ok(TransportResponse {
                    status: 404,
                    body: Bytes::new(),
                })
            }
            _ => Ok(TransportResponse {
                status: 200,
                body: Bytes::from_static(b"{}"),
            }),
        }
    }
}

fn make_context(transport: Arc<dyn Transport>) -> BootstrapContext {
    BootstrapContext::new(
        transport,
        BootstrapPolicy::Failure,
        "orders",
        "orders-*",
        Arc::new(|| json!({ "properties": { "id": { "type": "keyword" } } })),
        Arc::new(|| json!({ "number_of_shards": 1 })),
    )
}

#[tokio::test]
async fn second_bootstrap_short_circuits_index_template_put() {
    let transport = StatefulTransport::new();

    let mut ctx1 = make_context(transport.clone());
    let applied_first = bootstrap::bootstrap(&mut ctx1, false, InferenceOptions::default())
        .await
        .unwrap();
    assert!(applied_first, "first bootstrap must PUT the template");

    let mut ctx2 = make_context(transport.clone());
    let applied_second = bootstrap::bootstrap(&mut ctx2, false, InferenceOptions::default())
        .await
        .unwrap();
    assert!(
        !applied_second,
        "second bootstrap with identical settings/mappings must short-circuit"
    );

    assert_eq!(transport.put_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn none_policy_skips_all_network_calls() {
    let transport = MockTransport::new(vec![]);
    let mut ctx = BootstrapContext::new(
        transport.clone(),
        BootstrapPolicy::None,
        "orders",
        "orders-*",
        Arc::new(|| json!({})),
        Arc::new(|| json!({})),
    );
    let applied = bootstrap::bootstrap(&mut ctx, false, InferenceOptions::default())
        .await
        .unwrap();
    assert!(applied);
    assert!(transport.recorded().await.is_empty());
}
