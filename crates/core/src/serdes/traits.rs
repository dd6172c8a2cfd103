//! Codec trait definitions.

use crate::error::StreamsError;
use crate::types::Headers;

/// Typed codec between a domain value and its raw byte encoding.
///
/// All bytes passing between the typed store API and the raw store go
/// through a serde. The `topic` argument names the changelog (for stores)
/// or source topic (for ingestion) the bytes belong to; codecs that are
/// topic-dependent use it, the built-in ones ignore it.
///
/// # Thread Safety
///
/// Serdes must be `Send + Sync`: one codec instance is shared by every
/// store and task that resolves it from the ambient defaults.
pub trait Serde<T>: Send + Sync {
    /// Encode `data` for `topic`.
    fn serialize(&self, topic: &str, data: &T) -> Result<Vec<u8>, SerdeError>;

    /// Decode `data` read from `topic`.
    fn deserialize(&self, topic: &str, data: &[u8]) -> Result<T, SerdeError>;

    /// Decode with access to the record headers.
    ///
    /// Defaults to [`Serde::deserialize`].
    fn deserialize_with_headers(
        &self,
        topic: &str,
        _headers: &Headers,
        data: &[u8],
    ) -> Result<T, SerdeError> {
        self.deserialize(topic, data)
    }

    /// Short identifier used in logs.
    fn serde_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerdeError {
    /// Encoding failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Decoding failed (malformed or truncated bytes).
    #[error("Decode error: {0}")]
    Decode(String),
}

impl SerdeError {
    /// Attach the topic the codec was invoked for.
    pub fn on_topic(self, topic: &str) -> StreamsError {
        StreamsError::serialization(topic, self.to_string())
    }
}
