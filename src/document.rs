//! The capability trait a caller's document type implements.
//!
//! A trait the document type implements directly, rather than a registry of
//! per-channel delegate callbacks — avoids reflection in the hot path.

use chrono::{DateTime, Utc};

/// Routing-relevant accessors on an application document.
///
/// All three are optional: a channel routed with [`crate::routing::RoutingStrategy::DataStream`]
/// or [`crate::routing::RoutingStrategy::WiredStream`] never calls any of them.
pub trait RoutingAccessor {
    /// Stable document identifier, if the caller's domain has one.
    fn id(&self) -> Option<&str> {
        None
    }

    /// Content fingerprint used for scripted-hash upserts.
    fn content_hash(&self) -> Option<&str> {
        None
    }

    /// Document timestamp, used for date-rolling index name formatting.
    /// Falls back to `Utc::now()` at the call site when absent.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}
