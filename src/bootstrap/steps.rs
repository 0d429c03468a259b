//! The ordered provisioning steps. Each is a free function over the shared
//! [`BootstrapContext`] rather than a trait object hierarchy — there is a
//! fixed sequence, not an open set of pluggable stages.

use super::context::{BootstrapContext, DataStreamType};
use crate::error::ChannelError;
use crate::transport::Method;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, info};

fn hash_hex(parts: &[&str]) -> String {
    let mut hasher = xxhash_rust::xxh64::Xxh64::new(0);
    for part in parts {
        std::hash::Hasher::write(&mut hasher, part.as_bytes());
    }
    format!("{:016x}", std::hash::Hasher::finish(&hasher))
}

fn provisioning_err(step: &'static str, reason: impl Into<String>) -> ChannelError {
    ChannelError::ProvisioningFailure {
        step,
        reason: reason.into(),
    }
}

/// Step 1: lifecycle policy, skipped entirely on serverless.
pub async fn lifecycle_policy(ctx: &BootstrapContext) -> Result<(), ChannelError> {
    let Some(name) = &ctx.lifecycle_policy_name else {
        return Ok(());
    };
    if ctx.is_serverless().await {
        debug!(policy = %name, "skipping ILM policy on serverless");
        return Ok(());
    }

    let path = format!("/_ilm/policy/{name}");
    let existing = ctx
        .transport
        .request(Method::Get, &path, None, "application/json")
        .await
        .map_err(|e| provisioning_err("lifecycle_policy", e.to_string()))?;
    if existing.is_success() {
        debug!(policy = %name, "lifecycle policy already present");
        return Ok(());
    }

    let body = json!({
        "policy": {
            "phases": {
                "hot": { "actions": { "rollover": { "max_age": "30d", "max_primary_shard_size": "50gb" } } }
            }
        }
    });
    let resp = ctx
        .transport
        .request(
            Method::Put,
            &path,
            Some(Bytes::from(body.to_string())),
            "application/json",
        )
        .await
        .map_err(|e| provisioning_err("lifecycle_policy", e.to_string()))?;
    if !resp.is_success() {
        return Err(provisioning_err(
            "lifecycle_policy",
            String::from_utf8_lossy(&resp.body).into_owned(),
        ));
    }
    info!(policy = %name, "created lifecycle policy");
    Ok(())
}

/// Merges `extra` onto `base` when both are JSON objects; `extra` wins on key
/// collision. `extra` is ignored entirely (not merged) when it isn't an object,
/// since there is no sane way to overlay a scalar onto a settings document.
fn merge_settings(base: Value, extra: &Value) -> Value {
    let Value::Object(extra) = extra else {
        return base;
    };
    if extra.is_empty() {
        return base;
    }
    let mut base = match base {
        Value::Object(map) => map,
        other => {
            return other;
        }
    };
    for (k, v) in extra {
        base.insert(k.clone(), v.clone());
    }
    Value::Object(base)
}

/// Step 2: component templates (settings + mappings). Always PUT; computes
/// and stores `channel_fingerprint` afterward, plus the component template
/// names for `index_template` to compose against.
pub async fn component_templates(ctx: &mut BootstrapContext) -> Result<(), ChannelError> {
    let settings_body = merge_settings((ctx.settings_provider)(), &ctx.additional_settings);
    let mappings_body = (ctx.mappings_provider)();

    let settings_text = settings_body.to_string();
    let mappings_text = mappings_body.to_string();
    let fingerprint = hash_hex(&[&settings_text, &mappings_text]);

    let settings_name = format!("{}-settings", ctx.template_name);
    let mappings_name = format!("{}-mappings", ctx.template_name);

    put_component_template(ctx, &settings_name, json!({ "template": { "settings": settings_body } })).await?;

    let mut mappings_template = json!({ "template": { "mappings": mappings_body } });
    mappings_template["_meta"] = json!({ "hash": fingerprint });
    put_component_template(ctx, &mappings_name, mappings_template).await?;

    ctx.shared_properties
        .insert("component_template_settings_name".to_string(), json!(settings_name));
    ctx.shared_properties
        .insert("component_template_mappings_name".to_string(), json!(mappings_name));

    ctx.channel_fingerprint
        .get_or_init(|| async { fingerprint })
        .await;
    Ok(())
}

async fn put_component_template(
    ctx: &BootstrapContext,
    name: &str,
    body: Value,
) -> Result<(), ChannelError> {
    let path = format!("/_component_template/{name}");
    let resp = ctx
        .transport
        .request(
            Method::Put,
            &path,
            Some(Bytes::from(body.to_string())),
            "application/json",
        )
        .await
        .map_err(|e| provisioning_err("component_templates", e.to_string()))?;
    if !resp.is_success() {
        return Err(provisioning_err(
            "component_templates",
            String::from_utf8_lossy(&resp.body).into_owned(),
        ));
    }
    debug!(name, "component template applied");
    Ok(())
}

/// Step 3: inference endpoint(s), optional, used only for semantic-search variants.
pub async fn inference_endpoints(
    ctx: &BootstrapContext,
    endpoint_id: Option<&str>,
    reuse_existing: bool,
) -> Result<(), ChannelError> {
    let Some(endpoint_id) = endpoint_id else {
        return Ok(());
    };
    let path = format!("/_inference/sparse_embedding/{endpoint_id}");
    if reuse_existing {
        let existing = ctx
            .transport
            .request(Method::Get, &path, None, "application/json")
            .await
            .map_err(|e| provisioning_err("inference_endpoints", e.to_string()))?;
        if existing.is_success() {
            debug!(endpoint_id, "inference endpoint already present");
            return Ok(());
        }
    }

    let body = json!({ "service": "elasticsearch", "service_settings": { "num_allocations": 1, "num_threads": 1 } });
    let resp = ctx
        .transport
        .request(
            Method::Put,
            &path,
            Some(Bytes::from(body.to_string())),
            "application/json",
        )
        .await
        .map_err(|e| provisioning_err("inference_endpoints", e.to_string()))?;
    if !resp.is_success() {
        return Err(provisioning_err(
            "inference_endpoints",
            String::from_utf8_lossy(&resp.body).into_owned(),
        ));
    }
    info!(endpoint_id, "created inference endpoint");
    Ok(())
}

/// Step 4: data-stream lifecycle retention. No direct HTTP effect; stashes
/// the retention period for step 5 to embed.
pub fn data_stream_retention(ctx: &mut BootstrapContext, retention: Option<&str>) {
    ctx.retention = retention.map(str::to_owned);
}

fn builtin_composed_of(data_stream_type: Option<DataStreamType>) -> Vec<String> {
    let mut composed = vec!["data-streams-mappings".to_string()];
    match data_stream_type {
        Some(DataStreamType::Logs) => {
            composed.push("logs-settings".to_string());
            composed.push("logs-mappings".to_string());
        }
        Some(DataStreamType::Metrics) => {
            composed.push("metrics-settings".to_string());
            composed.push("metrics-mappings".to_string());
        }
        _ => {}
    }
    composed
}

/// Step 5: index template. HEAD/GET for the fingerprint short-circuit, else PUT.
pub async fn index_template(
    ctx: &BootstrapContext,
    is_data_stream: bool,
) -> Result<bool, ChannelError> {
    let fingerprint = ctx
        .fingerprint()
        .ok_or_else(|| ChannelError::Invariant("index_template ran before component_templates"))?
        .to_string();

    let path = format!("/_index_template/{}", ctx.template_name);
    let existing = ctx
        .transport
        .request(Method::Get, &path, None, "application/json")
        .await
        .map_err(|e| provisioning_err("index_template", e.to_string()))?;

    if existing.is_success() {
        if let Ok(body) = existing.json() {
            let stored_hash = body
                .pointer("/index_templates/0/index_template/_meta/hash")
                .and_then(Value::as_str);
            if stored_hash == Some(fingerprint.as_str()) {
                debug!(template = %ctx.template_name, "index template fingerprint unchanged, skipping PUT");
                return Ok(false);
            }
        }
    }

    let settings_name = ctx
        .shared_properties
        .get("component_template_settings_name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ChannelError::Invariant("index_template ran before component_templates"))?;
    let mappings_name = ctx
        .shared_properties
        .get("component_template_mappings_name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ChannelError::Invariant("index_template ran before component_templates"))?;

    let mut composed_of: Vec<String> = vec![settings_name, mappings_name];
    composed_of.extend(builtin_composed_of(ctx.data_stream_type));

    let mut template = json!({
        "index_patterns": [ctx.template_wildcard.clone()],
        "composed_of": composed_of,
        "priority": 201,
        "template": { "_meta": { "hash": fingerprint } },
    });

    if is_data_stream {
        template["template"]["data_stream"] = json!({});
        if let Some(retention) = &ctx.retention {
            template["template"]["lifecycle"] = json!({ "data_retention": retention });
        }
    }

    let resp = ctx
        .transport
        .request(
            Method::Put,
            &path,
            Some(Bytes::from(template.to_string())),
            "application/json",
        )
        .await
        .map_err(|e| provisioning_err("index_template", e.to_string()))?;
    if !resp.is_success() {
        return Err(provisioning_err(
            "index_template",
            String::from_utf8_lossy(&resp.body).into_owned(),
        ));
    }
    info!(template = %ctx.template_name, "index template applied");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_identical_input() {
        assert_eq!(hash_hex(&["a", "b"]), hash_hex(&["a", "b"]));
        assert_ne!(hash_hex(&["a", "b"]), hash_hex(&["a", "c"]));
    }

    #[test]
    fn builtin_composed_of_adds_logs_components() {
        let composed = builtin_composed_of(Some(DataStreamType::Logs));
        assert!(composed.contains(&"logs-settings".to_string()));
        assert!(composed.contains(&"data-streams-mappings".to_string()));
    }
}
