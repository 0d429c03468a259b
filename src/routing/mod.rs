//! Document-routing strategy.
//!
//! A closed `enum` rather than a trait object — there are exactly three
//! shapes and no caller ever needs a fourth.

mod date_pattern;

use crate::document::RoutingAccessor;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub use date_pattern::format_index_template;

/// Bulk operation discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkVerb {
    Create,
    Index,
    Update,
    ScriptedHashUpdate,
}

/// Everything the bulk request builder needs to emit one header line.
#[derive(Debug, Clone)]
pub struct BulkHeader {
    pub verb: BulkVerb,
    pub target_index: Option<String>,
    pub document_id: Option<String>,
    pub dynamic_templates: Option<Value>,
    pub pipeline: Option<String>,
    /// Populated only for `ScriptedHashUpdate`: the inline script plus the
    /// combined (channel_fingerprint ⊕ content_hash) value the script compares
    /// against the stored hash field.
    pub scripted_upsert_params: Option<ScriptedUpsertParams>,
}

#[derive(Debug, Clone)]
pub struct ScriptedUpsertParams {
    pub hash_field: String,
    pub combined_hash: String,
    /// Set only when the routing's `batch_index_date_field` is configured:
    /// the field name and value the update script should stamp alongside the
    /// document, so a later cleanup pass can select rows a batch didn't touch.
    pub batch_index_date_field: Option<String>,
    pub batch_index_date: Option<DateTime<Utc>>,
}

/// Result of routing one document: the header to emit plus the concrete index
/// name for refresh-target bookkeeping (may be `None` when the index is fixed
/// by the URL and never appears per-document).
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub header: BulkHeader,
    pub resolved_index: Option<String>,
}

/// Fixed field name the scripted-hash upsert compares against, unless the
/// caller's `Index` routing overrides it.
pub const DEFAULT_HASH_FIELD: &str = "_channel_hash";

#[derive(Debug, Clone)]
pub struct IndexRouting {
    /// Either a constant index name ("orders-v1") or a date-rolling template
    /// ("orders-{yyyy.MM.dd}"). See [`date_pattern`] for the template grammar.
    pub template: String,
    pub hash_field: String,
    /// When set, scripted-hash upserts also stamp this field with the
    /// document's resolved timestamp, for callers that prune stale rows by it.
    pub batch_index_date_field: Option<String>,
}

impl IndexRouting {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            hash_field: DEFAULT_HASH_FIELD.to_string(),
            batch_index_date_field: None,
        }
    }

    pub fn with_hash_field(mut self, field: impl Into<String>) -> Self {
        self.hash_field = field.into();
        self
    }

    pub fn with_batch_index_date_field(mut self, field: impl Into<String>) -> Self {
        self.batch_index_date_field = Some(field.into());
        self
    }

    fn is_constant(&self) -> bool {
        !self.template.contains('{')
    }
}

#[derive(Debug, Clone)]
pub enum RoutingStrategy {
    /// `create` without `_index`; the URL itself targets the data stream.
    DataStream { name: String },
    /// Per-document routing driven by id / content hash / timestamp.
    Index(IndexRouting),
    /// `create` without `_index`, pointed at a managed stream endpoint; this
    /// variant's bootstrap step is a no-op (the stream is provisioned out of band).
    WiredStream { name: String },
}

impl RoutingStrategy {
    /// The `_bulk` URL to POST to. For a non-constant `Index` template this is
    /// the generic `_bulk` endpoint — the index is carried per-document in the
    /// header instead.
    pub fn url(&self) -> String {
        match self {
            RoutingStrategy::DataStream { name } => format!("{name}/_bulk"),
            RoutingStrategy::WiredStream { name } => format!("{name}/_bulk"),
            RoutingStrategy::Index(routing) if routing.is_constant() => {
                format!("{}/_bulk", routing.template)
            }
            RoutingStrategy::Index(_) => "_bulk".to_string(),
        }
    }

    /// The name refresh calls should target after a drain.
    pub fn refresh_target(&self) -> Option<&str> {
        match self {
            RoutingStrategy::DataStream { name } => Some(name),
            RoutingStrategy::WiredStream { name } => Some(name),
            RoutingStrategy::Index(routing) if routing.is_constant() => Some(&routing.template),
            RoutingStrategy::Index(_) => None,
        }
    }

    /// Route one document, given the channel's fingerprint (for scripted-hash
    /// upserts) and `now` as the timestamp fallback.
    pub fn route<D: RoutingAccessor>(
        &self,
        doc: &D,
        channel_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> RoutingOutcome {
        match self {
            RoutingStrategy::DataStream { .. } | RoutingStrategy::WiredStream { .. } => {
                RoutingOutcome {
                    header: BulkHeader {
                        verb: BulkVerb::Create,
                        target_index: None,
                        document_id: None,
                        dynamic_templates: None,
                        pipeline: None,
                        scripted_upsert_params: None,
                    },
                    resolved_index: None,
                }
            }
            RoutingStrategy::Index(routing) => self.route_index(routing, doc, channel_fingerprint, now),
        }
    }

    fn route_index<D: RoutingAccessor>(
        &self,
        routing: &IndexRouting,
        doc: &D,
        channel_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> RoutingOutcome {
        let timestamp = doc.timestamp().unwrap_or(now);
        let resolved_index = format_index_template(&routing.template, timestamp);
        // A constant template is embedded in the URL and omitted from the
        // header as a per-request size optimization.
        let target_index = if routing.is_constant() {
            None
        } else {
            Some(resolved_index.clone())
        };

        let id = doc.id();
        let content_hash = doc.content_hash();

        let header = match (content_hash, id) {
            (Some(hash), Some(id)) => BulkHeader {
                verb: BulkVerb::ScriptedHashUpdate,
                target_index: target_index.clone(),
                document_id: Some(id.to_string()),
                dynamic_templates: None,
                pipeline: None,
                scripted_upsert_params: Some(ScriptedUpsertParams {
                    hash_field: routing.hash_field.clone(),
                    combined_hash: combined_fingerprint(channel_fingerprint, hash),
                    batch_index_date_field: routing.batch_index_date_field.clone(),
                    batch_index_date: routing.batch_index_date_field.as_ref().map(|_| timestamp),
                }),
            },
            (_, Some(id)) => BulkHeader {
                verb: BulkVerb::Index,
                target_index: target_index.clone(),
                document_id: Some(id.to_string()),
                dynamic_templates: None,
                pipeline: None,
                scripted_upsert_params: None,
            },
            (_, None) => BulkHeader {
                verb: BulkVerb::Create,
                target_index: target_index.clone(),
                document_id: None,
                dynamic_templates: None,
                pipeline: None,
                scripted_upsert_params: None,
            },
        };

        RoutingOutcome {
            header,
            resolved_index: Some(resolved_index),
        }
    }
}

/// `channel_fingerprint ⊕ content_hash`: a mapping change invalidates every
/// per-document cached hash since the channel fingerprint feeds into all of them.
pub fn combined_fingerprint(channel_fingerprint: &str, content_hash: &str) -> String {
    let mut buf = String::with_capacity(channel_fingerprint.len() + content_hash.len() + 1);
    buf.push_str(channel_fingerprint);
    buf.push(':');
    buf.push_str(content_hash);
    format!("{:016x}", xxhash_rust::xxh64::xxh64(buf.as_bytes(), 0))
}

/// The Painless-like inline script every `ScriptedHashUpdate` header references.
/// No-ops when the stored hash matches; otherwise overwrites the document and
/// the hash field (and, if present, the caller-supplied batch-tracking fields).
pub fn scripted_hash_update_script(hash_field: &str) -> Value {
    json!({
        "source": format!(
            "if (ctx._source.containsKey('{hash_field}') && ctx._source['{hash_field}'] == params.hash) {{ ctx.op = 'noop'; }} else {{ ctx._source = params.doc; ctx._source['{hash_field}'] = params.hash; if (params.containsKey('batch_index_date')) {{ ctx._source[params.batch_index_date_field] = params.batch_index_date; }} }}"
        ),
        "lang": "painless",
    })
}
