//! Metered key/value store
//!
//! Typed facade over a raw key/value store. Keys and values are encoded
//! with codecs resolved once at `init`; every data operation is timed on
//! its own store-level sensor.

use std::fmt::Debug;
use std::sync::Arc;

use strata_core::serdes::{prepare_key_serde, prepare_value_serde, store_changelog_topic};
use strata_core::traits::{CachedStateStore, KeyValueBytesStore, KeyValueIter, StateStore};
use strata_core::{KeyValue, ProcessorContext, Result, SerdeSlot, StateSerdes, StreamsError};
use tracing::debug;

use crate::flush_listener::{key_value_adapter, FlushedChange};
use crate::iterator::MeteredIterator;
use crate::metered::MeteringWrapper;
use crate::metrics::{ALL, DELETE, GET, PUT, PUT_ALL, PUT_IF_ABSENT, RANGE};

const OPERATIONS: &[&str] = &[PUT, PUT_IF_ABSENT, PUT_ALL, GET, DELETE, RANGE, ALL];

/// Re-raise a raw-store failure with the typed key and value attached.
pub(crate) fn annotate_put_failure<K: Debug, V: Debug>(
    store: &str,
    key: &K,
    value: Option<&V>,
    e: StreamsError,
) -> StreamsError {
    if !e.is_storage_failure() {
        return e;
    }
    let message = format!(
        "failed to put key {:?} and value {:?} into state store {}",
        key, value, store
    );
    StreamsError::processor_state(message, e)
}

/// Typed, metered key/value store.
///
/// # Example
///
/// ```
/// use strata_core::{ProcessorContext, SerdeSlot, Serdes};
/// use strata_core::traits::StateStore;
/// use strata_state::MeteredKeyValueStore;
/// use strata_storage::InMemoryKeyValueStore;
///
/// let mut store = MeteredKeyValueStore::<String, i64>::new(
///     Box::new(InMemoryKeyValueStore::new("counts")),
///     "in-memory-state",
///     SerdeSlot::Explicit(Serdes::string()),
///     SerdeSlot::Explicit(Serdes::long()),
/// );
/// store.init(&ProcessorContext::builder("app").build()).unwrap();
/// store.put(&"a".to_string(), &1).unwrap();
/// assert_eq!(store.get(&"a".to_string()).unwrap(), Some(1));
/// ```
pub struct MeteredKeyValueStore<K, V> {
    wrapper: MeteringWrapper<dyn KeyValueBytesStore>,
    key_serde: SerdeSlot<K>,
    value_serde: SerdeSlot<V>,
    serdes: Option<Arc<StateSerdes<K, V>>>,
}

impl<K, V> MeteredKeyValueStore<K, V>
where
    K: Debug + 'static,
    V: Debug + 'static,
{
    /// Wrap `inner`; `metrics_scope` names the store type in metric tags.
    pub fn new(
        inner: Box<dyn KeyValueBytesStore>,
        metrics_scope: impl Into<String>,
        key_serde: SerdeSlot<K>,
        value_serde: SerdeSlot<V>,
    ) -> Self {
        Self {
            wrapper: MeteringWrapper::new(inner, metrics_scope),
            key_serde,
            value_serde,
            serdes: None,
        }
    }

    /// Resolved codecs.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the first successful `init`.
    pub fn serdes(&self) -> Result<&Arc<StateSerdes<K, V>>> {
        self.serdes
            .as_ref()
            .ok_or_else(|| StreamsError::not_initialized(self.wrapper.name()))
    }

    fn init_serdes(&mut self, context: &ProcessorContext) -> Result<()> {
        if self.serdes.is_some() {
            return Ok(());
        }
        let defaults = context.default_serdes();
        let key_serde = prepare_key_serde(&self.key_serde, defaults)?;
        let value_serde = prepare_value_serde(&self.value_serde, defaults)?;
        let topic = store_changelog_topic(context.application_id(), self.wrapper.name());
        debug!(
            target: "strata::state",
            store = %self.wrapper.name(),
            key_serde = key_serde.serde_id(),
            value_serde = value_serde.serde_id(),
            "Resolved store serdes"
        );
        self.serdes = Some(Arc::new(StateSerdes::new(topic, key_serde, value_serde)));
        Ok(())
    }

    /// Run a read on the raw store with the codecs, timed on `operation`.
    pub(crate) fn measured<T>(
        &self,
        operation: &str,
        action: impl FnOnce(&dyn KeyValueBytesStore, &StateSerdes<K, V>) -> Result<T>,
    ) -> Result<T> {
        let serdes = self.serdes()?;
        self.wrapper.measure(operation, |store| action(store, serdes))
    }

    /// Run a write on the raw store with the codecs, timed on `operation`.
    pub(crate) fn measured_mut<T>(
        &mut self,
        operation: &str,
        action: impl FnOnce(&mut dyn KeyValueBytesStore, &StateSerdes<K, V>) -> Result<T>,
    ) -> Result<T> {
        let serdes = Arc::clone(self.serdes()?);
        self.wrapper
            .measure_mut(operation, |store| action(store, &serdes))
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.measured(GET, |store, serdes| {
            store
                .get(&serdes.raw_key(key)?)?
                .map(|raw| serdes.value_from(&raw))
                .transpose()
        })
    }

    /// Store `value` under `key`.
    ///
    /// Raw-store failures are re-raised as `ProcessorState` naming the key
    /// and value.
    pub fn put(&mut self, key: &K, value: &V) -> Result<()> {
        let name = self.wrapper.name().to_string();
        self.measured_mut(PUT, |store, serdes| {
            let raw_key = serdes.raw_key(key)?;
            let raw_value = serdes.raw_value(value)?;
            store.put(raw_key, Some(raw_value))
        })
        .map_err(|e| annotate_put_failure(&name, key, Some(value), e))
    }

    /// Store `value` only if `key` is absent; returns the existing value.
    pub fn put_if_absent(&mut self, key: &K, value: &V) -> Result<Option<V>> {
        self.measured_mut(PUT_IF_ABSENT, |store, serdes| {
            let raw_key = serdes.raw_key(key)?;
            let raw_value = serdes.raw_value(value)?;
            store
                .put_if_absent(raw_key, raw_value)?
                .map(|raw| serdes.value_from(&raw))
                .transpose()
        })
    }

    /// Apply each entry; `None` values delete.
    pub fn put_all(&mut self, entries: &[KeyValue<K, Option<V>>]) -> Result<()> {
        self.measured_mut(PUT_ALL, |store, serdes| {
            let raw = entries
                .iter()
                .map(|entry| -> Result<KeyValue<Vec<u8>, Option<Vec<u8>>>> {
                    let value = entry
                        .value
                        .as_ref()
                        .map(|v| serdes.raw_value(v))
                        .transpose()?;
                    Ok(KeyValue::pair(serdes.raw_key(&entry.key)?, value))
                })
                .collect::<Result<Vec<_>>>()?;
            store.put_all(raw)
        })
    }

    /// Remove `key`; returns the removed value.
    pub fn delete(&mut self, key: &K) -> Result<Option<V>> {
        self.measured_mut(DELETE, |store, serdes| {
            store
                .delete(&serdes.raw_key(key)?)?
                .map(|raw| serdes.value_from(&raw))
                .transpose()
        })
    }

    fn metered_iter<'a>(
        &'a self,
        operation: &str,
        open: impl FnOnce(&'a dyn KeyValueBytesStore, &StateSerdes<K, V>) -> Result<KeyValueIter<'a, Vec<u8>, Vec<u8>>>,
    ) -> Result<KeyValueIter<'a, K, V>> {
        let serdes = Arc::clone(self.serdes()?);
        let (sensor, clock) = self.wrapper.iterator_metering(operation)?;
        let raw = open(self.wrapper.wrapped(), &serdes)?;
        Ok(Box::new(MeteredIterator::new(
            raw,
            move |kv: KeyValue<Vec<u8>, Vec<u8>>| {
                Ok(KeyValue::pair(serdes.key_from(&kv.key)?, serdes.value_from(&kv.value)?))
            },
            sensor,
            clock,
        )))
    }

    /// Entries with `from <= key <= to` by encoded key order.
    ///
    /// One observation is recorded on `range` when the iterator closes.
    pub fn range(&self, from: &K, to: &K) -> Result<KeyValueIter<'_, K, V>> {
        self.metered_iter(RANGE, |store, serdes| {
            store.range(&serdes.raw_key(from)?, &serdes.raw_key(to)?)
        })
    }

    /// All entries by encoded key order.
    ///
    /// One observation is recorded on `all` when the iterator closes.
    pub fn all(&self) -> Result<KeyValueIter<'_, K, V>> {
        self.metered_iter(ALL, |store, _| store.all())
    }

    /// Approximate number of entries.
    pub fn approximate_num_entries(&self) -> Result<u64> {
        if !self.wrapper.is_initialized() {
            return Err(StreamsError::not_initialized(self.wrapper.name()));
        }
        Ok(self.wrapper.wrapped().approximate_num_entries())
    }

    /// Register a typed listener for cache flushes.
    ///
    /// Returns false if the raw store has no cache or the store is not
    /// initialized.
    pub fn set_flush_listener<F>(&mut self, listener: F, send_old_values: bool) -> bool
    where
        F: FnMut(FlushedChange<K, V>) + Send + 'static,
    {
        let Some(serdes) = self.serdes.as_ref().map(Arc::clone) else {
            return false;
        };
        let adapter = key_value_adapter(self.wrapper.name().to_string(), serdes, send_old_values, listener);
        self.wrapper.set_raw_flush_listener(adapter, send_old_values)
    }
}

impl<K, V> StateStore for MeteredKeyValueStore<K, V>
where
    K: Debug + 'static,
    V: Debug + 'static,
{
    fn name(&self) -> &str {
        self.wrapper.name()
    }

    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.init_serdes(context)?;
        self.wrapper.init(context, OPERATIONS)
    }

    fn flush(&mut self) -> Result<()> {
        self.wrapper.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.wrapper.close()
    }

    fn is_open(&self) -> bool {
        self.wrapper.is_open()
    }

    fn persistent(&self) -> bool {
        self.wrapper.persistent()
    }

    fn caching(&mut self) -> Option<&mut dyn CachedStateStore> {
        self.wrapper.caching()
    }
}
