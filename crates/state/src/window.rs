//! Metered window store
//!
//! Typed facade over a raw window store. Point writes and reads are timed
//! on `put` and `fetch`; each range fetch records one `fetch` observation
//! when its iterator closes. Multi-key fetches rebuild windowed keys from
//! the raw store keys using the store's window size.

use std::fmt::Debug;
use std::sync::Arc;

use strata_core::metrics::Sensor;
use strata_core::serdes::{prepare_key_serde, prepare_value_serde, store_changelog_topic};
use strata_core::traits::{CachedStateStore, KeyValueIter, StateStore, WindowBytesStore, WindowStoreIter};
use strata_core::window_key::WindowKeySchema;
use strata_core::{
    Bytes, Clock, KeyValue, ProcessorContext, Result, SerdeSlot, StateSerdes, StreamsError,
    Windowed,
};
use tracing::debug;

use crate::flush_listener::{window_adapter, FlushedChange};
use crate::iterator::MeteredIterator;
use crate::key_value::annotate_put_failure;
use crate::metered::MeteringWrapper;
use crate::metrics::{FETCH, PUT};

const OPERATIONS: &[&str] = &[PUT, FETCH];

/// Typed, metered window store.
pub struct MeteredWindowStore<K, V> {
    wrapper: MeteringWrapper<dyn WindowBytesStore>,
    window_size_ms: i64,
    key_serde: SerdeSlot<K>,
    value_serde: SerdeSlot<V>,
    serdes: Option<Arc<StateSerdes<K, V>>>,
}

impl<K, V> MeteredWindowStore<K, V>
where
    K: Debug + 'static,
    V: Debug + 'static,
{
    /// Wrap `inner` for windows of `window_size_ms`.
    pub fn new(
        inner: Box<dyn WindowBytesStore>,
        window_size_ms: i64,
        metrics_scope: impl Into<String>,
        key_serde: SerdeSlot<K>,
        value_serde: SerdeSlot<V>,
    ) -> Self {
        Self {
            wrapper: MeteringWrapper::new(inner, metrics_scope),
            window_size_ms,
            key_serde,
            value_serde,
            serdes: None,
        }
    }

    /// Window size in milliseconds.
    pub fn window_size_ms(&self) -> i64 {
        self.window_size_ms
    }

    /// Resolved codecs.
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
            window_size_ms = self.window_size_ms,
            "Resolved store serdes"
        );
        self.serdes = Some(Arc::new(StateSerdes::new(topic, key_serde, value_serde)));
        Ok(())
    }

    /// Store `value` for `key` in the window starting at `window_start_ms`;
    /// `None` deletes the window's entry.
    ///
    /// Raw-store failures are re-raised as `ProcessorState` naming the key
    /// and value.
    pub fn put(&mut self, key: &K, value: Option<&V>, window_start_ms: i64) -> Result<()> {
        let serdes = Arc::clone(self.serdes()?);
        let name = self.wrapper.name().to_string();
        self.wrapper
            .measure_mut(PUT, |store| {
                let raw_key = serdes.raw_key(key)?;
                let raw_value = value.map(|v| serdes.raw_value(v)).transpose()?;
                store.put(&raw_key, raw_value, window_start_ms)
            })
            .map_err(|e| annotate_put_failure(&name, key, value, e))
    }

    /// Store `value` in the window starting at the current record's
    /// timestamp.
    #[deprecated(note = "use `put` with an explicit window start")]
    pub fn put_at_record_time(&mut self, key: &K, value: Option<&V>) -> Result<()> {
        let timestamp = self.wrapper.context()?.timestamp();
        self.put(key, value, timestamp)
    }

    /// Value of `key` in the window starting at `window_start_ms`.
    pub fn fetch(&self, key: &K, window_start_ms: i64) -> Result<Option<V>> {
        let serdes = self.serdes()?;
        self.wrapper.measure(FETCH, |store| {
            store
                .fetch(&serdes.raw_key(key)?, window_start_ms)?
                .map(|raw| serdes.value_from(&raw))
                .transpose()
        })
    }

    /// Windows of `key` starting in `[time_from, time_to]`, as
    /// (window start, value) by increasing window start.
    pub fn fetch_range(&self, key: &K, time_from: i64, time_to: i64) -> Result<WindowStoreIter<'_, V>> {
        let serdes = Arc::clone(self.serdes()?);
        let (sensor, clock) = self.wrapper.iterator_metering(FETCH)?;
        let raw = self
            .wrapper
            .wrapped()
            .fetch_range(&serdes.raw_key(key)?, time_from, time_to)?;
        Ok(Box::new(MeteredIterator::new(
            raw,
            move |kv: KeyValue<i64, Bytes>| Ok(KeyValue::pair(kv.key, serdes.value_from(&kv.value)?)),
            sensor,
            clock,
        )))
    }

    fn windowed_iter<'a>(
        &'a self,
        raw: KeyValueIter<'a, Bytes, Bytes>,
        serdes: Arc<StateSerdes<K, V>>,
        (sensor, clock): (Arc<Sensor>, Arc<dyn Clock>),
    ) -> KeyValueIter<'a, Windowed<K>, V> {
        let window_size_ms = self.window_size_ms;
        Box::new(MeteredIterator::new(
            raw,
            move |kv: KeyValue<Bytes, Bytes>| {
                let key = WindowKeySchema::from_store_key(
                    &kv.key,
                    window_size_ms,
                    serdes.key_serde().as_ref(),
                    serdes.topic(),
                )?;
                Ok(KeyValue::pair(key, serdes.value_from(&kv.value)?))
            },
            sensor,
            clock,
        ))
    }

    /// Windows of keys in `[from, to]` starting in `[time_from, time_to]`.
    pub fn fetch_key_range(
        &self,
        from: &K,
        to: &K,
        time_from: i64,
        time_to: i64,
    ) -> Result<KeyValueIter<'_, Windowed<K>, V>> {
        let serdes = Arc::clone(self.serdes()?);
        let metering = self.wrapper.iterator_metering(FETCH)?;
        let raw = self.wrapper.wrapped().fetch_key_range(
            &serdes.raw_key(from)?,
            &serdes.raw_key(to)?,
            time_from,
            time_to,
        )?;
        Ok(self.windowed_iter(raw, serdes, metering))
    }

    /// Windows of all keys starting in `[time_from, time_to]`.
    pub fn fetch_all(&self, time_from: i64, time_to: i64) -> Result<KeyValueIter<'_, Windowed<K>, V>> {
        let serdes = Arc::clone(self.serdes()?);
        let metering = self.wrapper.iterator_metering(FETCH)?;
        let raw = self.wrapper.wrapped().fetch_all(time_from, time_to)?;
        Ok(self.windowed_iter(raw, serdes, metering))
    }

    /// Every window of every key.
    pub fn all(&self) -> Result<KeyValueIter<'_, Windowed<K>, V>> {
        let serdes = Arc::clone(self.serdes()?);
        let metering = self.wrapper.iterator_metering(FETCH)?;
        let raw = self.wrapper.wrapped().all()?;
        Ok(self.windowed_iter(raw, serdes, metering))
    }

    /// Register a typed listener for cache flushes.
    ///
    /// Returns false if the raw store has no cache or the store is not
    /// initialized.
    pub fn set_flush_listener<F>(&mut self, listener: F, send_old_values: bool) -> bool
    where
        F: FnMut(FlushedChange<Windowed<K>, V>) + Send + 'static,
    {
        let Some(serdes) = self.serdes.as_ref().map(Arc::clone) else {
            return false;
        };
        let adapter = window_adapter(
            self.wrapper.name().to_string(),
            serdes,
            self.window_size_ms,
            send_old_values,
            listener,
        );
        self.wrapper.set_raw_flush_listener(adapter, send_old_values)
    }
}

impl<K, V> StateStore for MeteredWindowStore<K, V>
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
