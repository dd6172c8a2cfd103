//! Resolved codec pair bound to a store's changelog topic.

use std::fmt;
use std::sync::Arc;

use super::traits::Serde;
use crate::error::Result;
use crate::types::Headers;

/// Changelog topic name for a store.
pub fn store_changelog_topic(application_id: &str, store_name: &str) -> String {
    format!("{application_id}-{store_name}-changelog")
}

/// Immutable, resolved key/value codecs of one store.
///
/// Codec failures are reported as `StreamsError::Serialization` carrying
/// the topic.
pub struct StateSerdes<K, V> {
    topic: String,
    key_serde: Arc<dyn Serde<K>>,
    value_serde: Arc<dyn Serde<V>>,
}

impl<K, V> StateSerdes<K, V> {
    /// Bind a codec pair to `topic`.
    pub fn new(
        topic: impl Into<String>,
        key_serde: Arc<dyn Serde<K>>,
        value_serde: Arc<dyn Serde<V>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            key_serde,
            value_serde,
        }
    }

    /// Topic the codecs are invoked with.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The key codec.
    pub fn key_serde(&self) -> &Arc<dyn Serde<K>> {
        &self.key_serde
    }

    /// The value codec.
    pub fn value_serde(&self) -> &Arc<dyn Serde<V>> {
        &self.value_serde
    }

    /// Encode a key.
    pub fn raw_key(&self, key: &K) -> Result<Vec<u8>> {
        self.key_serde
            .serialize(&self.topic, key)
            .map_err(|e| e.on_topic(&self.topic))
    }

    /// Encode a value.
    pub fn raw_value(&self, value: &V) -> Result<Vec<u8>> {
        self.value_serde
            .serialize(&self.topic, value)
            .map_err(|e| e.on_topic(&self.topic))
    }

    /// Decode a key.
    pub fn key_from(&self, raw: &[u8]) -> Result<K> {
        self.key_serde
            .deserialize_with_headers(&self.topic, &Headers::new(), raw)
            .map_err(|e| e.on_topic(&self.topic))
    }

    /// Decode a value.
    pub fn value_from(&self, raw: &[u8]) -> Result<V> {
        self.value_serde
            .deserialize_with_headers(&self.topic, &Headers::new(), raw)
            .map_err(|e| e.on_topic(&self.topic))
    }
}

impl<K, V> fmt::Debug for StateSerdes<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSerdes")
            .field("topic", &self.topic)
            .field("key_serde", &self.key_serde.serde_id())
            .field("value_serde", &self.value_serde.serde_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamsError;
    use crate::serdes::Serdes;

    #[test]
    fn test_changelog_topic_name() {
        assert_eq!(store_changelog_topic("app", "counts"), "app-counts-changelog");
    }

    #[test]
    fn test_decode_error_carries_topic() {
        let serdes = StateSerdes::new("app-counts-changelog", Serdes::string(), Serdes::long());
        match serdes.value_from(&[1, 2]) {
            Err(StreamsError::Serialization { topic, .. }) => {
                assert_eq!(topic, "app-counts-changelog");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_raw_key_and_back() {
        let serdes = StateSerdes::new("t", Serdes::string(), Serdes::long());
        let raw = serdes.raw_key(&"k1".to_string()).unwrap();
        assert_eq!(raw, b"k1");
        assert_eq!(serdes.key_from(&raw).unwrap(), "k1");
    }
}
