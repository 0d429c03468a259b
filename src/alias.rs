//! Alias manager.
//!
//! Applies the "latest" + optional "search" alias swap for time-stamped index
//! rotations, and falls back to `_resolve/index` when the caller doesn't
//! already know the concrete index name.

use crate::error::ChannelError;
use crate::transport::{Method, Transport};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

fn provisioning_err(reason: impl Into<String>) -> ChannelError {
    ChannelError::ProvisioningFailure {
        step: "alias_swap",
        reason: reason.into(),
    }
}

/// Serializes `_aliases` calls per channel via an internal `Mutex`; does not
/// protect against another process touching the same aliases concurrently.
pub struct AliasManager {
    transport: Arc<dyn Transport>,
    lock: Mutex<()>,
}

impl AliasManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            lock: Mutex::new(()),
        }
    }

    /// Swaps `latest_alias = format(pattern, "latest")` onto `index`, and
    /// `search_alias` (if provided) alongside it, in one atomic `_aliases`
    /// actions block. If `index` is empty, resolves the alphabetically-last
    /// concrete index matching `pattern` first.
    pub async fn apply_aliases(
        &self,
        index: &str,
        pattern: &str,
        search_alias: Option<&str>,
    ) -> Result<(), ChannelError> {
        let _guard = self.lock.lock().await;

        let resolved = if index.is_empty() {
            self.resolve_latest_index(pattern).await?
        } else {
            index.to_string()
        };

        let latest_alias = pattern.replace('*', "latest");
        let mut actions = Vec::new();

        actions.push(json!({ "remove": { "index": pattern, "alias": latest_alias } }));
        actions.push(json!({ "add": { "index": resolved, "alias": latest_alias } }));

        if let Some(search_alias) = search_alias {
            actions.push(json!({ "remove": { "index": pattern, "alias": search_alias } }));
            actions.push(json!({ "add": { "index": resolved, "alias": search_alias } }));
        }

        let body = json!({ "actions": actions });
        let resp = self
            .transport
            .request(
                Method::Post,
                "/_aliases",
                Some(Bytes::from(body.to_string())),
                "application/json",
            )
            .await
            .map_err(|e| provisioning_err(e.to_string()))?;

        if !resp.is_success() {
            return Err(provisioning_err(String::from_utf8_lossy(&resp.body).into_owned()));
        }
        info!(index = %resolved, alias = %latest_alias, "swapped aliases");
        Ok(())
    }

    /// `apply_aliases` with no known concrete index: resolves via
    /// `_resolve/index` first. Kept as a separate entry point since callers
    /// that already know the concrete index can skip the extra round trip.
    pub async fn apply_aliases_resolved(
        &self,
        pattern: &str,
        search_alias: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.apply_aliases("", pattern, search_alias).await
    }

    async fn resolve_latest_index(&self, pattern: &str) -> Result<String, ChannelError> {
        let path = format!("/_resolve/index/{pattern}");
        let resp = self
            .transport
            .request(Method::Get, &path, None, "application/json")
            .await
            .map_err(|e| provisioning_err(e.to_string()))?;
        if !resp.is_success() {
            return Err(provisioning_err(String::from_utf8_lossy(&resp.body).into_owned()));
        }
        let body: Value = resp.json()?;
        let mut names: Vec<String> = body
            .get("indices")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.get("name").and_then(Value::as_str).map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.pop().ok_or_else(|| {
            provisioning_err(format!("no concrete index resolved for pattern '{pattern}'"))
        })
    }
}
