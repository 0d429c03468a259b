//! Bulk request builder.
//!
//! Serializes a document slice plus per-document operation headers into the
//! newline-delimited bulk body. Writes into a caller-supplied, reusable buffer
//! so the worker pool can hold one allocation across retries of the same
//! batch.

use crate::document::RoutingAccessor;
use crate::error::ChannelError;
use crate::routing::{scripted_hash_update_script, BulkHeader, BulkVerb, RoutingStrategy};
use crate::serializer::DocumentSerializer;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// One built request ready to POST.
pub struct BuiltBulkRequest {
    pub url: String,
    pub body: Vec<u8>,
    /// `submitted[i]` is the index into the original slice that produced the
    /// `i`-th ndjson pair — the response interpreter zips against this, not
    /// against the raw slice, since serialization failures are dropped before
    /// the request is built.
    pub submitted: Vec<usize>,
    /// Items that never made it into the body because serialization failed.
    pub immediate_rejections: Vec<(usize, ChannelError)>,
}

/// Build a bulk request body for `docs`, routed via `strategy`.
///
/// `out` is cleared and reused across calls (e.g. across retries of the same
/// batch) to avoid reallocating the ndjson buffer every attempt.
pub fn build<T, S>(
    docs: &[T],
    strategy: &RoutingStrategy,
    serializer: &S,
    serialize_buf: &mut Vec<u8>,
    channel_fingerprint: &str,
    now: DateTime<Utc>,
) -> BuiltBulkRequest
where
    T: RoutingAccessor,
    S: DocumentSerializer<T>,
{
    serialize_buf.clear();
    let mut submitted = Vec::with_capacity(docs.len());
    let mut immediate_rejections = Vec::new();

    for (idx, doc) in docs.iter().enumerate() {
        let outcome = strategy.route(doc, channel_fingerprint, now);

        let mut doc_bytes = Vec::new();
        if let Err(e) = serializer.write(doc, &mut doc_bytes) {
            immediate_rejections.push((idx, e));
            continue;
        }
        let doc_value: Value = match serde_json::from_slice(&doc_bytes) {
            Ok(v) => v,
            Err(e) => {
                immediate_rejections.push((idx, ChannelError::SerializationFailure(e.to_string())));
                continue;
            }
        };

        write_pair(serialize_buf, &outcome.header, &doc_value);
        submitted.push(idx);
    }

    BuiltBulkRequest {
        url: strategy.url(),
        body: std::mem::take(serialize_buf),
        submitted,
        immediate_rejections,
    }
}

fn write_pair(out: &mut Vec<u8>, header: &BulkHeader, doc: &Value) {
    let (verb_key, body) = match header.verb {
        BulkVerb::Create => ("create", doc.clone()),
        BulkVerb::Index => ("index", doc.clone()),
        BulkVerb::Update => ("update", json!({ "doc": doc, "doc_as_upsert": true })),
        BulkVerb::ScriptedHashUpdate => {
            let params = header
                .scripted_upsert_params
                .as_ref()
                .expect("ScriptedHashUpdate header always carries scripted_upsert_params");
            let mut script_params = json!({
                "doc": doc,
                "hash": params.combined_hash,
            });
            if let (Some(field), Some(date)) =
                (&params.batch_index_date_field, params.batch_index_date)
            {
                let obj = script_params.as_object_mut().unwrap();
                obj.insert("batch_index_date_field".to_string(), json!(field));
                obj.insert("batch_index_date".to_string(), json!(date.to_rfc3339()));
            }
            (
                "update",
                json!({
                    "script": {
                        "source": scripted_hash_update_script(&params.hash_field)["source"],
                        "lang": "painless",
                        "params": script_params,
                    },
                    "upsert": doc,
                    "scripted_upsert": true,
                }),
            )
        }
    };

    let mut action = json!({});
    {
        let obj = action.as_object_mut().unwrap();
        let mut inner = serde_json::Map::new();
        if let Some(index) = &header.target_index {
            inner.insert("_index".to_string(), json!(index));
        }
        if let Some(id) = &header.document_id {
            inner.insert("_id".to_string(), json!(id));
        }
        if let Some(dt) = &header.dynamic_templates {
            inner.insert("dynamic_templates".to_string(), dt.clone());
        }
        if let Some(pipeline) = &header.pipeline {
            inner.insert("pipeline".to_string(), json!(pipeline));
        }
        obj.insert(verb_key.to_string(), Value::Object(inner));
    }

    serde_json::to_writer(&mut *out, &action).expect("header serialization cannot fail");
    out.push(b'\n');
    serde_json::to_writer(&mut *out, &body).expect("body serialization cannot fail");
    out.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::IndexRouting;
    use crate::serializer::ReflectiveSerializer;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Doc {
        id: String,
        n: u32,
    }

    impl RoutingAccessor for Doc {
        fn id(&self) -> Option<&str> {
            Some(&self.id)
        }
    }

    #[test]
    fn index_with_id_emits_index_header() {
        let strategy = RoutingStrategy::Index(IndexRouting::new("orders-v1"));
        let docs = vec![Doc {
            id: "o-42".to_string(),
            n: 1,
        }];
        let mut buf = Vec::new();
        let built = build(
            &docs,
            &strategy,
            &ReflectiveSerializer,
            &mut buf,
            "fingerprint",
            Utc::now(),
        );
        let text = String::from_utf8(built.body).unwrap();
        assert_eq!(text, "{\"index\":{\"_id\":\"o-42\"}}\n{\"id\":\"o-42\",\"n\":1}\n");
        assert_eq!(built.url, "orders-v1/_bulk");
    }

    #[derive(Serialize)]
    struct Bare {
        n: u32,
    }
    impl RoutingAccessor for Bare {}

    #[test]
    fn data_stream_always_creates() {
        let strategy = RoutingStrategy::DataStream {
            name: "logs-app-default".to_string(),
        };
        let docs = vec![Bare { n: 7 }];
        let mut buf = Vec::new();
        let built = build(
            &docs,
            &strategy,
            &ReflectiveSerializer,
            &mut buf,
            "fp",
            Utc::now(),
        );
        let text = String::from_utf8(built.body).unwrap();
        assert_eq!(text, "{\"create\":{}}\n{\"n\":7}\n");
        assert_eq!(built.url, "logs-app-default/_bulk");
    }
}
