//! Error taxonomy for the buffered ingest channel.
//!
//! Nothing above the transport seam panics on caller-reachable paths; failures are
//! either retried internally or handed back through the observability hooks in
//! [`crate::channel::options::ChannelOptions`]. `ChannelError` only escapes as a
//! `Result` from bootstrap (under [`crate::bootstrap::BootstrapPolicy::Failure`])
//! and from the narrow [`crate::transport::Transport`] / [`crate::serializer::DocumentSerializer`]
//! seams.

use thiserror::Error;

/// The kinds of failure the channel distinguishes when deciding retry vs. reject.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Connection refused, timeout, or any 5xx that applies to the whole request.
    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    /// HTTP 429 at the envelope level.
    #[error("server signalled throttling (429): {0}")]
    ThrottleFromServer(String),

    /// Any non-2xx from a bootstrap step.
    #[error("provisioning step '{step}' failed: {reason}")]
    ProvisioningFailure { step: &'static str, reason: String },

    /// Per-document JSON encoding error.
    #[error("failed to serialize document: {0}")]
    SerializationFailure(String),

    /// A cancellation token was signalled mid-wait.
    #[error("operation cancelled")]
    Cancellation,

    /// Programmer error: e.g. writing after `try_complete`.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
