//! Response interpreter.
//!
//! Zips the bulk response's `items` array with the submitted slice and classifies
//! each pairing. Retry policy itself lives in the worker pool; this module
//! only classifies.

use crate::transport::TransportResponse;
use serde_json::Value;

/// Outcome of interpreting one submitted item against its bulk response entry.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Accepted,
    RetryEntireBatch,
    RetryItem,
    RejectItem { status: u16, reason: String },
}

/// The classified result for an entire export attempt.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One entry per submitted document, in submission order.
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    /// 429/5xx at transport or envelope level: retry the whole batch without
    /// inspecting individual items.
    pub fn retry_entire(count: usize) -> Self {
        Self {
            items: std::iter::repeat_with(|| ItemOutcome::RetryEntireBatch)
                .take(count)
                .collect(),
        }
    }
}

/// Classify a bulk response body against the batch that produced it.
///
/// `batch_len` is the number of documents submitted; it is used to build a
/// degenerate [`BatchOutcome`] when the response shape is unexpected (treated as
/// a whole-batch retry, matching the "transport failure" failure mode).
pub fn classify(response: &TransportResponse, batch_len: usize) -> BatchOutcome {
    if response.status == 429 {
        return BatchOutcome::retry_entire(batch_len);
    }
    if (500..600).contains(&response.status) && response.body.is_empty() {
        // No item-level detail available (e.g. a 503 from a proxy in front of the
        // cluster) — fall back to a transport-style whole-batch retry.
        return BatchOutcome::retry_entire(batch_len);
    }

    let parsed = match response.json() {
        Ok(v) => v,
        Err(_) => return BatchOutcome::retry_entire(batch_len),
    };

    let items = match parsed.get("items").and_then(Value::as_array) {
        Some(items) => items,
        None => return BatchOutcome::retry_entire(batch_len),
    };

    let mut outcomes = Vec::with_capacity(batch_len);
    for item in items.iter().take(batch_len) {
        outcomes.push(classify_item(item));
    }
    while outcomes.len() < batch_len {
        outcomes.push(ItemOutcome::RetryItem);
    }

    BatchOutcome { items: outcomes }
}

fn classify_item(item: &Value) -> ItemOutcome {
    // Each item has a single key: index | create | update | delete.
    let Some(op) = item.as_object().and_then(|o| o.values().next()) else {
        return ItemOutcome::RejectItem {
            status: 0,
            reason: "malformed bulk response item".to_string(),
        };
    };

    let status = op.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;

    match status {
        200..=299 => ItemOutcome::Accepted,
        500..=599 => ItemOutcome::RetryItem,
        _ => {
            let reason = op
                .get("error")
                .and_then(|e| e.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("no reason provided")
                .to_string();
            ItemOutcome::RejectItem { status, reason }
        }
    }
}
