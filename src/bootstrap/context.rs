//! Shared state threaded through the bootstrap step pipeline.

use crate::transport::Transport;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// What a step failure does to the overall `bootstrap` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPolicy {
    /// Skip everything; `bootstrap` returns `Ok(true)` without touching the server.
    None,
    /// Any step failure makes `bootstrap` return `Ok(false)`; nothing raises.
    Silent,
    /// Any step failure raises (`anyhow::Error::from(ChannelError)` with context).
    Failure,
}

/// Coarse shape of the data stream this channel writes into, used by the
/// index-template step to pick built-in composed-of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStreamType {
    Logs,
    Metrics,
    Generic,
}

/// A mapping/settings provider: callers hand the sequencer opaque JSON blobs
/// rather than the sequencer inferring schema (Non-goal: no schema inference).
pub type JsonProvider = Arc<dyn Fn() -> Value + Send + Sync>;

pub struct BootstrapContext {
    pub transport: Arc<dyn Transport>,
    pub policy: BootstrapPolicy,
    pub template_name: String,
    pub template_wildcard: String,
    pub mappings_provider: JsonProvider,
    pub settings_provider: JsonProvider,
    pub data_stream_type: Option<DataStreamType>,
    /// Merged over `settings_provider`'s output before it is PUT, so callers
    /// can override individual settings (e.g. `number_of_shards`) without
    /// rebuilding the whole body.
    pub additional_settings: Value,
    pub lifecycle_policy_name: Option<String>,
    pub retention: Option<String>,
    pub is_serverless: OnceCell<bool>,
    pub channel_fingerprint: OnceCell<String>,
    /// Scratch space later steps read earlier steps' writes from (e.g.
    /// `index_template` reads the component template names `component_templates`
    /// stored here).
    pub shared_properties: HashMap<String, Value>,
}

impl BootstrapContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: BootstrapPolicy,
        template_name: impl Into<String>,
        template_wildcard: impl Into<String>,
        mappings_provider: JsonProvider,
        settings_provider: JsonProvider,
    ) -> Self {
        Self {
            transport,
            policy,
            template_name: template_name.into(),
            template_wildcard: template_wildcard.into(),
            mappings_provider,
            settings_provider,
            data_stream_type: None,
            additional_settings: Value::Null,
            lifecycle_policy_name: None,
            retention: None,
            is_serverless: OnceCell::new(),
            channel_fingerprint: OnceCell::new(),
            shared_properties: HashMap::new(),
        }
    }

    /// One HEAD against a known endpoint, cached for the lifetime of this
    /// context so repeated steps don't re-probe the cluster.
    pub async fn is_serverless(&self) -> bool {
        *self
            .is_serverless
            .get_or_init(|| async {
                match self
                    .transport
                    .request(crate::transport::Method::Get, "/_serverless", None, "application/json")
                    .await
                {
                    Ok(resp) => resp.is_success(),
                    Err(_) => false,
                }
            })
            .await
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.channel_fingerprint.get().map(|s| s.as_str())
    }
}
