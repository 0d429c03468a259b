//! Document serialization.

use crate::error::ChannelError;
use serde::Serialize;

/// Writes a document into a growable byte buffer.
///
/// The bulk request builder reuses one buffer across an entire batch, so
/// implementations must only append to `out`, never clear it.
pub trait DocumentSerializer<T>: Send + Sync {
    fn write(&self, doc: &T, out: &mut Vec<u8>) -> Result<(), ChannelError>;
}

/// Default serializer for any document that implements `serde::Serialize`.
///
/// Used when the caller does not supply a custom [`DocumentSerializer`].
pub struct ReflectiveSerializer;

impl<T: Serialize> DocumentSerializer<T> for ReflectiveSerializer {
    fn write(&self, doc: &T, out: &mut Vec<u8>) -> Result<(), ChannelError> {
        serde_json::to_writer(out, doc).map_err(|e| ChannelError::SerializationFailure(e.to_string()))
    }
}
