//! Metered key/value store of timestamped values
//!
//! Values are stored as `be64(timestamp) ++ encode(value)`. On top of the
//! plain key/value operations this store offers reads that also return the
//! encoded bytes, and a conditional write that skips monotonic duplicates.

use std::fmt::Debug;

use strata_core::serdes::value_and_timestamp::values_are_same_and_time_is_increasing;
use strata_core::traits::{CachedStateStore, KeyValueBytesStore, KeyValueIter, StateStore};
use strata_core::{
    Bytes, KeyValue, ProcessorContext, Result, SerdeSlot, ValueAndTimestamp, ValueAndTimestampSerde,
};

use crate::flush_listener::FlushedChange;
use crate::key_value::{annotate_put_failure, MeteredKeyValueStore};
use crate::metrics::{GET, PUT};

/// A decoded value together with the bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAndDeserializedValue<V> {
    /// Encoded envelope as stored
    pub serialized_value: Bytes,
    /// Decoded envelope
    pub value: ValueAndTimestamp<V>,
}

/// Typed, metered store of [`ValueAndTimestamp`] values.
pub struct MeteredTimestampedKeyValueStore<K, V> {
    inner: MeteredKeyValueStore<K, ValueAndTimestamp<V>>,
}

impl<K, V> MeteredTimestampedKeyValueStore<K, V>
where
    K: Debug + 'static,
    V: Debug + 'static,
{
    /// Wrap `inner`.
    ///
    /// An unset value codec becomes an envelope around the default value
    /// codec at `init`.
    pub fn new(
        inner: Box<dyn KeyValueBytesStore>,
        metrics_scope: impl Into<String>,
        key_serde: SerdeSlot<K>,
        value_serde: SerdeSlot<ValueAndTimestamp<V>>,
    ) -> Self {
        let value_serde = if value_serde.is_unset() {
            ValueAndTimestampSerde::wrapping(None)
        } else {
            value_serde
        };
        Self {
            inner: MeteredKeyValueStore::new(inner, metrics_scope, key_serde, value_serde),
        }
    }

    /// Value and timestamp stored under `key`.
    pub fn get(&self, key: &K) -> Result<Option<ValueAndTimestamp<V>>> {
        self.inner.get(key)
    }

    /// Value under `key` with the bytes it was decoded from, timed on `get`.
    pub fn get_with_binary(&self, key: &K) -> Result<Option<RawAndDeserializedValue<V>>> {
        self.inner.measured(GET, |store, serdes| {
            match store.get(&serdes.raw_key(key)?)? {
                Some(raw) => {
                    let value = serdes.value_from(&raw)?;
                    Ok(Some(RawAndDeserializedValue {
                        serialized_value: raw,
                        value,
                    }))
                }
                None => Ok(None),
            }
        })
    }

    /// Store `value` under `key`.
    pub fn put(&mut self, key: &K, value: &ValueAndTimestamp<V>) -> Result<()> {
        self.inner.put(key, value)
    }

    /// Write `new_value` unless it repeats `old_serialized_value`.
    ///
    /// The write is skipped, and `false` returned, only when the encoded
    /// payloads are byte-identical and the new timestamp is not older than
    /// the old one. An out-of-order timestamp always writes. Timed on `put`.
    pub fn put_if_different_values(
        &mut self,
        key: &K,
        new_value: &ValueAndTimestamp<V>,
        old_serialized_value: Option<&[u8]>,
    ) -> Result<bool> {
        let name = self.inner.name().to_string();
        self.inner
            .measured_mut(PUT, |store, serdes| {
                let raw_value = serdes.raw_value(new_value)?;
                if values_are_same_and_time_is_increasing(old_serialized_value, &raw_value) {
                    return Ok(false);
                }
                store.put(serdes.raw_key(key)?, Some(raw_value))?;
                Ok(true)
            })
            .map_err(|e| annotate_put_failure(&name, key, Some(new_value), e))
    }

    /// Store `value` only if `key` is absent; returns the existing value.
    pub fn put_if_absent(
        &mut self,
        key: &K,
        value: &ValueAndTimestamp<V>,
    ) -> Result<Option<ValueAndTimestamp<V>>> {
        self.inner.put_if_absent(key, value)
    }

    /// Apply each entry; `None` values delete.
    pub fn put_all(&mut self, entries: &[KeyValue<K, Option<ValueAndTimestamp<V>>>]) -> Result<()> {
        self.inner.put_all(entries)
    }

    /// Remove `key`; returns the removed value.
    pub fn delete(&mut self, key: &K) -> Result<Option<ValueAndTimestamp<V>>> {
        self.inner.delete(key)
    }

    /// Entries with `from <= key <= to` by encoded key order.
    pub fn range(&self, from: &K, to: &K) -> Result<KeyValueIter<'_, K, ValueAndTimestamp<V>>> {
        self.inner.range(from, to)
    }

    /// All entries by encoded key order.
    pub fn all(&self) -> Result<KeyValueIter<'_, K, ValueAndTimestamp<V>>> {
        self.inner.all()
    }

    /// Approximate number of entries.
    pub fn approximate_num_entries(&self) -> Result<u64> {
        self.inner.approximate_num_entries()
    }

    /// Register a typed listener for cache flushes.
    pub fn set_flush_listener<F>(&mut self, listener: F, send_old_values: bool) -> bool
    where
        F: FnMut(FlushedChange<K, ValueAndTimestamp<V>>) + Send + 'static,
    {
        self.inner.set_flush_listener(listener, send_old_values)
    }
}

impl<K, V> StateStore for MeteredTimestampedKeyValueStore<K, V>
where
    K: Debug + 'static,
    V: Debug + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.inner.init(context)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn persistent(&self) -> bool {
        self.inner.persistent()
    }

    fn caching(&mut self) -> Option<&mut dyn CachedStateStore> {
        self.inner.caching()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_core::{DefaultSerdes, Serdes};
    use strata_storage::testing::RecordingKeyValueStore;

    fn open(store: RecordingKeyValueStore) -> MeteredTimestampedKeyValueStore<String, String> {
        let context = ProcessorContext::builder("app")
            .default_serdes(DefaultSerdes::new(Serdes::string(), Serdes::string()))
            .build();
        let mut store = MeteredTimestampedKeyValueStore::new(
            Box::new(store),
            "in-memory-state",
            SerdeSlot::Unset,
            SerdeSlot::Unset,
        );
        store.init(&context).unwrap();
        store
    }

    #[test]
    fn test_value_serde_wraps_default_value_serde() {
        let mut store = open(RecordingKeyValueStore::new("ts"));
        let key = "k".to_string();
        store
            .put(&key, &ValueAndTimestamp::make("value".to_string(), 7))
            .unwrap();
        let raw = store.get_with_binary(&key).unwrap().unwrap();
        assert_eq!(raw.serialized_value, b"\0\0\0\0\0\0\0\x07value".to_vec());
        assert_eq!(raw.value, ValueAndTimestamp::make("value".to_string(), 7));
    }

    #[test]
    fn test_get_with_binary_absent() {
        let store = open(RecordingKeyValueStore::new("ts"));
        assert_eq!(store.get_with_binary(&"missing".to_string()).unwrap(), None);
    }

    #[test]
    fn test_explicit_value_serde_is_kept() {
        let context = ProcessorContext::builder("app")
            .default_serdes(DefaultSerdes::new(Serdes::string(), Serdes::long()))
            .build();
        let explicit: Arc<dyn strata_core::Serde<ValueAndTimestamp<String>>> =
            Arc::new(ValueAndTimestampSerde::new(Serdes::string()));
        let mut store = MeteredTimestampedKeyValueStore::<String, String>::new(
            Box::new(RecordingKeyValueStore::new("ts")),
            "in-memory-state",
            SerdeSlot::Unset,
            SerdeSlot::Explicit(explicit),
        );
        store.init(&context).unwrap();
        store
            .put(&"k".to_string(), &ValueAndTimestamp::make("v".to_string(), 1))
            .unwrap();
        assert_eq!(
            store.get(&"k".to_string()).unwrap(),
            Some(ValueAndTimestamp::make("v".to_string(), 1))
        );
    }

    #[test]
    fn test_put_if_different_values_skips_monotonic_duplicate() {
        let raw_store = RecordingKeyValueStore::new("ts");
        let calls = raw_store.calls();
        let mut store = open(raw_store);
        let key = "a".to_string();
        store.put(&key, &ValueAndTimestamp::make("x".to_string(), 100)).unwrap();
        let old = store.get_with_binary(&key).unwrap().unwrap().serialized_value;
        assert_eq!(calls.puts(), 1);

        let written = store
            .put_if_different_values(&key, &ValueAndTimestamp::make("x".to_string(), 150), Some(&old))
            .unwrap();
        assert!(!written);
        assert_eq!(calls.puts(), 1);

        let written = store
            .put_if_different_values(&key, &ValueAndTimestamp::make("x".to_string(), 100), Some(&old))
            .unwrap();
        assert!(!written);
        assert_eq!(calls.puts(), 1);
    }

    #[test]
    fn test_put_if_different_values_writes_out_of_order_and_changes() {
        let raw_store = RecordingKeyValueStore::new("ts");
        let calls = raw_store.calls();
        let mut store = open(raw_store);
        let key = "a".to_string();
        store.put(&key, &ValueAndTimestamp::make("x".to_string(), 100)).unwrap();
        let old = store.get_with_binary(&key).unwrap().unwrap().serialized_value;

        assert!(store
            .put_if_different_values(&key, &ValueAndTimestamp::make("x".to_string(), 50), Some(&old))
            .unwrap());
        assert_eq!(calls.puts(), 2);
        assert_eq!(store.get(&key).unwrap().unwrap().timestamp(), 50);

        assert!(store
            .put_if_different_values(&key, &ValueAndTimestamp::make("y".to_string(), 200), Some(&old))
            .unwrap());
        assert_eq!(calls.puts(), 3);

        assert!(store
            .put_if_different_values(&"b".to_string(), &ValueAndTimestamp::make("x".to_string(), 1), None)
            .unwrap());
        assert_eq!(calls.puts(), 4);
    }

    #[test]
    fn test_put_failure_names_key_and_value() {
        let raw_store = RecordingKeyValueStore::new("ts");
        let calls = raw_store.calls();
        let mut store = open(raw_store);
        calls.fail_puts(true);
        let err = store
            .put_if_different_values(&"a".to_string(), &ValueAndTimestamp::make("x".to_string(), 1), None)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"a\""));
        assert!(message.contains("\"x\""));
        assert!(message.contains("ts"));
    }
}
