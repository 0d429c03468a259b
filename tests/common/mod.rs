//! Shared in-memory `Transport` fake for integration tests.

use async_trait::async_trait;
use bulkchan::{ChannelError, Method, Transport, TransportResponse};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Once;
use tokio::sync::Mutex;

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing_subscriber` writer once per test binary, so `tracing`
/// calls made by the library under test actually go somewhere instead of
/// being silently dropped.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One recorded request, kept for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

/// A scripted response for the n-th call to a given path prefix.
pub enum Script {
    /// Every item in the batch succeeds.
    AllAccepted,
    /// Envelope-level 429; whole batch must be retried.
    Throttled,
    /// Every item in the batch comes back with a 503 (per-item retry).
    AllServerError,
    /// Every item in the batch comes back with a 400 (reject, no retry).
    AllRejected,
    /// Fixed raw response, bypassing bulk-item shaping.
    Raw(TransportResponse),
}

pub struct MockTransport {
    pub requests: Mutex<Vec<RecordedRequest>>,
    /// Scripts are consumed in order per call to `/` (bulk) paths; once
    /// exhausted, falls back to `AllAccepted`.
    scripts: Mutex<Vec<Script>>,
}

impl MockTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        init_tracing();
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(scripts),
        })
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    fn count_ndjson_pairs(body: &str) -> usize {
        body.lines().count() / 2
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        _content_type: &'static str,
    ) -> Result<TransportResponse, ChannelError> {
        let body_text = body.map(|b| String::from_utf8_lossy(&b).into_owned());
        self.requests.lock().await.push(RecordedRequest {
            method,
            path: path.to_string(),
            body: body_text.clone(),
        });

        if !path.ends_with("/_bulk") {
            return Ok(TransportResponse {
                status: 200,
                body: Bytes::from_static(b"{}"),
            });
        }

        let batch_len = body_text
            .as_deref()
            .map(Self::count_ndjson_pairs)
            .unwrap_or(0);

        let mut scripts = self.scripts.lock().await;
        let script = if scripts.is_empty() {
            Script::AllAccepted
        } else {
            scripts.remove(0)
        };

        Ok(match script {
            Script::AllAccepted => accepted_response(batch_len),
            Script::Throttled => TransportResponse {
                status: 429,
                body: Bytes::from_static(b"{\"error\":\"throttled\"}"),
            },
            Script::AllServerError => items_response(batch_len, 503, Some("node overloaded")),
            Script::AllRejected => items_response(batch_len, 400, Some("mapper_parsing_exception")),
            Script::Raw(resp) => resp,
        })
    }
}

fn accepted_response(count: usize) -> TransportResponse {
    let items: Vec<Value> = (0..count)
        .map(|_| json!({ "index": { "status": 201 } }))
        .collect();
    TransportResponse {
        status: 200,
        body: Bytes::from(json!({ "errors": false, "items": items }).to_string()),
    }
}

fn items_response(count: usize, status: u16, reason: Option<&str>) -> TransportResponse {
    let items: Vec<Value> = (0..count)
        .map(|_| {
            let mut entry = json!({ "status": status });
            if let Some(reason) = reason {
                entry["error"] = json!({ "reason": reason });
            }
            json!({ "index": entry })
        })
        .collect();
    TransportResponse {
        status: 200,
        body: Bytes::from(json!({ "errors": true, "items": items }).to_string()),
    }
}
