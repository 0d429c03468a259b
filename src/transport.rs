//! Transport.
//!
//! The channel, bootstrap sequencer, and alias manager are all generic over
//! [`Transport`]. The only concrete implementation shipped here wraps the
//! `elasticsearch` crate's low-level transport.

use crate::error::ChannelError;
use async_trait::async_trait;
use bytes::Bytes;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::Method as EsMethod;
use url::Url;

/// The HTTP verbs the bootstrap/bulk/alias code issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl From<Method> for EsMethod {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => EsMethod::Get,
            Method::Head => EsMethod::Head,
            Method::Post => EsMethod::Post,
            Method::Put => EsMethod::Put,
            Method::Delete => EsMethod::Delete,
        }
    }
}

/// Status code plus raw body bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<serde_json::Value, ChannelError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ChannelError::SerializationFailure(e.to_string()))
    }
}

/// Narrow async HTTP client the channel never constructs — it is always injected.
///
/// Connection pooling, auth, and transport-level retries live entirely on the
/// other side of this trait; the channel only sees a status code, a body, and
/// (on failure) a [`ChannelError::TransientTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        content_type: &'static str,
    ) -> Result<TransportResponse, ChannelError>;
}

/// Adapter over `elasticsearch::http::transport::Transport`.
///
/// This is the only module allowed to depend on the `elasticsearch`/`url` crates;
/// everything above this seam is transport-agnostic and testable with a fake.
pub struct ElasticsearchTransport {
    transport: elasticsearch::http::transport::Transport,
}

impl ElasticsearchTransport {
    pub fn new(es_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(es_url)?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let transport = TransportBuilder::new(conn_pool).disable_proxy().build()?;
        Ok(Self { transport })
    }

    pub fn from_elasticsearch_transport(
        transport: elasticsearch::http::transport::Transport,
    ) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Transport for ElasticsearchTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        content_type: &'static str,
    ) -> Result<TransportResponse, ChannelError> {
        let body_string = body
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();

        let mut headers = elasticsearch::http::headers::HeaderMap::new();
        if let Ok(value) = elasticsearch::http::headers::HeaderValue::from_str(content_type) {
            headers.insert(elasticsearch::http::headers::CONTENT_TYPE, value);
        }

        let send_result = if body_string.is_empty() {
            self.transport
                .send::<(), (), ()>(method.into(), path, headers, None, None, None)
                .await
        } else {
            self.transport
                .send::<String, (), ()>(method.into(), path, headers, None, Some(body_string), None)
                .await
        };

        let response = send_result.map_err(|e| ChannelError::TransientTransport(e.to_string()))?;
        let status = response.status_code().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ChannelError::TransientTransport(e.to_string()))?;

        Ok(TransportResponse {
            status,
            body: Bytes::from(body),
        })
    }
}
