//! Orchestrator: coordinates two channels for incremental sync.
//!
//! Decides between `reindex` mode (writes land only on `primary`; `secondary`
//! is caught up via a server-side `_reindex` at `complete`) and `multiplex`
//! mode (writes land on both), based on whether bootstrap detected a mapping
//! change on either channel.

use crate::alias::AliasManager;
use crate::bootstrap::{self, BootstrapContext, InferenceOptions};
use crate::channel::Channel;
use crate::document::RoutingAccessor;
use crate::error::ChannelError;
use crate::transport::{Method, Transport};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::{json, Map};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub type PreBootstrapTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type PostCompleteHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// `secondary` is assumed current except for the tail since `batch_timestamp`.
    Reindex,
    /// Every document is written to both channels.
    Multiplex,
}

/// Construction parameters for [`Orchestrator`].
pub struct OrchestratorOptions {
    pub alias_pattern: String,
    pub search_alias: Option<String>,
    /// Field compared against `batch_timestamp` to select rows `_reindex` must
    /// catch up. Configurable since the field name varies by mapping.
    pub last_updated_field: String,
    /// Field `delete_stale_from_primary`/`delete_stale_from_secondary` prune
    /// by, comparing against `batch_timestamp`. For this to find anything,
    /// the channel's `RoutingStrategy::Index` must be configured with a
    /// matching `IndexRouting::with_batch_index_date_field`, which is what
    /// actually stamps the field on each scripted-hash upsert.
    pub batch_index_date_field: String,
    pub pre_bootstrap_tasks: Vec<PreBootstrapTask>,
    pub on_post_complete: Option<PostCompleteHook>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            alias_pattern: String::new(),
            search_alias: None,
            last_updated_field: "last_updated".to_string(),
            batch_index_date_field: "batch_index_date".to_string(),
            pre_bootstrap_tasks: Vec::new(),
            on_post_complete: None,
        }
    }
}

/// Coordinates `primary`/`secondary` channels sharing a document type `T`.
pub struct Orchestrator<T> {
    primary: Channel<T>,
    secondary: Channel<T>,
    transport: Arc<dyn Transport>,
    alias: AliasManager,
    strategy: SyncStrategy,
    options: OrchestratorOptions,
    primary_refresh_target: String,
    secondary_refresh_target: String,
    /// Captured at construction so it is stable across the whole run.
    batch_timestamp: DateTime<Utc>,
}

impl<T> Orchestrator<T>
where
    T: RoutingAccessor + Clone + Send + Sync + 'static,
{
    /// Runs pre-bootstrap tasks, bootstraps `primary`, decides the sync
    /// strategy, and (if warranted) bootstraps `secondary` too.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        primary: Channel<T>,
        secondary: Channel<T>,
        mut primary_ctx: BootstrapContext,
        mut secondary_ctx: BootstrapContext,
        is_data_stream: bool,
        primary_refresh_target: impl Into<String>,
        secondary_refresh_target: impl Into<String>,
        options: OrchestratorOptions,
    ) -> anyhow::Result<Self> {
        for task in &options.pre_bootstrap_tasks {
            task().await;
        }

        let transport = primary_ctx.transport.clone();
        let primary_applied =
            bootstrap::bootstrap(&mut primary_ctx, is_data_stream, InferenceOptions::default()).await?;

        let strategy = if primary_applied {
            SyncStrategy::Multiplex
        } else if !Self::search_alias_exists(&transport, options.search_alias.as_deref()).await {
            SyncStrategy::Multiplex
        } else {
            let secondary_applied =
                bootstrap::bootstrap(&mut secondary_ctx, is_data_stream, InferenceOptions::default()).await?;
            if secondary_applied {
                SyncStrategy::Multiplex
            } else {
                SyncStrategy::Reindex
            }
        };

        info!(?strategy, "orchestrator sync strategy decided");

        Ok(Self {
            primary,
            secondary,
            alias: AliasManager::new(transport.clone()),
            transport,
            strategy,
            options,
            primary_refresh_target: primary_refresh_target.into(),
            secondary_refresh_target: secondary_refresh_target.into(),
            batch_timestamp: Utc::now(),
        })
    }

    async fn search_alias_exists(transport: &Arc<dyn Transport>, alias: Option<&str>) -> bool {
        let Some(alias) = alias else { return false };
        let path = format!("/_alias/{alias}");
        matches!(
            transport.request(Method::Head, &path, None, "application/json").await,
            Ok(resp) if resp.is_success()
        )
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Writes `doc` per the active strategy: `reindex` routes only to
    /// `primary`; `multiplex` writes to both.
    pub fn write(&self, doc: T) -> bool {
        match self.strategy {
            SyncStrategy::Reindex => self.primary.try_write(doc),
            SyncStrategy::Multiplex => {
                let primary_ok = self.primary.try_write(doc.clone());
                let secondary_ok = self.secondary.try_write(doc);
                primary_ok && secondary_ok
            }
        }
    }

    /// Drains both channels, refreshes the written indices, reconciles
    /// `secondary` in `reindex` mode, swaps aliases, prunes `primary`, and
    /// invokes `on_post_complete`.
    pub async fn complete(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.primary.try_complete();
        self.secondary.try_complete();

        if !self.primary.wait_for_drain_async(None, cancel).await {
            warn!("primary channel did not drain before deadline");
        }
        if !self.secondary.wait_for_drain_async(None, cancel).await {
            warn!("secondary channel did not drain before deadline");
        }

        self.refresh(&self.primary_refresh_target).await?;
        self.refresh(&self.secondary_refresh_target).await?;

        if self.strategy == SyncStrategy::Reindex {
            self.reindex_primary_to_secondary().await?;
            self.delete_stale_from_secondary().await?;
        }

        self.alias
            .apply_aliases_resolved(&self.options.alias_pattern, self.options.search_alias.as_deref())
            .await?;
        self.delete_stale_from_primary().await?;

        if let Some(hook) = &self.options.on_post_complete {
            hook();
        }
        Ok(())
    }

    async fn refresh(&self, target: &str) -> Result<(), ChannelError> {
        let path = format!("{target}/_refresh");
        let resp = self
            .transport
            .request(Method::Post, &path, None, "application/json")
            .await?;
        if !resp.is_success() {
            warn!(target, status = resp.status, "refresh returned non-2xx");
        }
        Ok(())
    }

    async fn reindex_primary_to_secondary(&self) -> Result<(), ChannelError> {
        let mut range = Map::new();
        range.insert(
            self.options.last_updated_field.clone(),
            json!({ "gte": self.batch_timestamp.to_rfc3339() }),
        );
        let body = json!({
            "source": { "index": self.primary_refresh_target, "query": { "range": range } },
            "dest": { "index": self.secondary_refresh_target },
        });
        let resp = self
            .transport
            .request(
                Method::Post,
                "/_reindex",
                Some(Bytes::from(body.to_string())),
                "application/json",
            )
            .await?;
        if !resp.is_success() {
            return Err(ChannelError::ProvisioningFailure {
                step: "reindex",
                reason: String::from_utf8_lossy(&resp.body).into_owned(),
            });
        }
        Ok(())
    }

    async fn delete_stale_from_secondary(&self) -> Result<(), ChannelError> {
        self.delete_by_batch_index_date(&self.secondary_refresh_target).await
    }

    async fn delete_stale_from_primary(&self) -> Result<(), ChannelError> {
        self.delete_by_batch_index_date(&self.primary_refresh_target).await
    }

    async fn delete_by_batch_index_date(&self, target: &str) -> Result<(), ChannelError> {
        let mut range = Map::new();
        range.insert(
            self.options.batch_index_date_field.clone(),
            json!({ "lt": self.batch_timestamp.to_rfc3339() }),
        );
        let body = json!({ "query": { "range": range } });
        let path = format!("{target}/_delete_by_query");
        let resp = self
            .transport
            .request(
                Method::Post,
                &path,
                Some(Bytes::from(body.to_string())),
                "application/json",
            )
            .await?;
        if !resp.is_success() {
            return Err(ChannelError::ProvisioningFailure {
                step: "delete_by_query",
                reason: String::from_utf8_lossy(&resp.body).into_owned(),
            });
        }
        Ok(())
    }
}
