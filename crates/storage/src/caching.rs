//! Write-back caching layer
//!
//! Writes are buffered as dirty entries and written through to the wrapped
//! store on `flush`, or as soon as the number of dirty entries exceeds the
//! configured maximum. Each entry written through produces one
//! [`FlushEvent`] for the registered listener, carrying the value it
//! replaced when old values were requested.
//!
//! Reads see buffered writes: a dirty entry shadows the wrapped store, and
//! a buffered delete hides the key.

use std::collections::BTreeMap;
use std::fmt;

use strata_core::iter::SnapshotIterator;
use strata_core::traits::{
    CachedStateStore, FlushEvent, KeyValueBytesStore, KeyValueIter, RawFlushListener, StateStore,
};
use strata_core::{Bytes, KeyValue, ProcessorContext, Result};
use tracing::debug;

/// Default number of dirty entries buffered before a write-through.
pub const DEFAULT_MAX_DIRTY_ENTRIES: usize = 1_000;

#[derive(Debug, Clone)]
struct DirtyEntry {
    value: Option<Bytes>,
    timestamp: i64,
}

/// Caching layer over a raw key/value store.
pub struct CachingKeyValueStore<S> {
    inner: S,
    dirty: BTreeMap<Bytes, DirtyEntry>,
    max_dirty_entries: usize,
    listener: Option<RawFlushListener>,
    send_old_values: bool,
    context: Option<ProcessorContext>,
}

impl<S: KeyValueBytesStore> CachingKeyValueStore<S> {
    /// Cache writes to `inner` with the default buffer size.
    pub fn new(inner: S) -> Self {
        Self::with_max_dirty_entries(inner, DEFAULT_MAX_DIRTY_ENTRIES)
    }

    /// Cache writes to `inner`, writing through once more than
    /// `max_dirty_entries` are buffered.
    pub fn with_max_dirty_entries(inner: S, max_dirty_entries: usize) -> Self {
        Self {
            inner,
            dirty: BTreeMap::new(),
            max_dirty_entries,
            listener: None,
            send_old_values: false,
            context: None,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of buffered entries.
    pub fn dirty_entries(&self) -> usize {
        self.dirty.len()
    }

    fn record_timestamp(&self) -> i64 {
        self.context.as_ref().map_or(0, ProcessorContext::timestamp)
    }

    fn buffer(&mut self, key: Bytes, value: Option<Bytes>) -> Result<()> {
        let timestamp = self.record_timestamp();
        self.dirty.insert(key, DirtyEntry { value, timestamp });
        if self.dirty.len() > self.max_dirty_entries {
            self.flush_dirty()?;
        }
        Ok(())
    }

    /// Write every dirty entry through, emitting one event per entry.
    ///
    /// Entries are written in key order and leave the buffer only once the
    /// inner store accepted them. If a write or the listener fails, the
    /// entries not yet written stay buffered.
    fn flush_dirty(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        debug!(
            target: "strata::storage",
            store = %self.inner.name(),
            entries = self.dirty.len(),
            "Flushing cache"
        );
        while let Some((key, entry)) = self
            .dirty
            .first_key_value()
            .map(|(key, entry)| (key.clone(), entry.clone()))
        {
            let old_value = if self.listener.is_some() && self.send_old_values {
                self.inner.get(&key)?
            } else {
                None
            };
            self.inner.put(key.clone(), entry.value.clone())?;
            self.dirty.remove(&key);
            if let Some(listener) = self.listener.as_mut() {
                listener(FlushEvent {
                    key,
                    new_value: entry.value,
                    old_value,
                    timestamp: entry.timestamp,
                })?;
            }
        }
        Ok(())
    }

    fn merged(
        &self,
        underlying: KeyValueIter<'_, Bytes, Bytes>,
        dirty: impl Iterator<Item = (Bytes, Option<Bytes>)>,
    ) -> Result<KeyValueIter<'static, Bytes, Bytes>> {
        let mut merged = BTreeMap::new();
        for entry in underlying {
            let entry = entry?;
            merged.insert(entry.key, entry.value);
        }
        for (key, value) in dirty {
            match value {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }
        let entries = merged
            .into_iter()
            .map(|(key, value)| KeyValue::pair(key, value))
            .collect();
        Ok(Box::new(SnapshotIterator::new(entries)))
    }
}

impl<S: KeyValueBytesStore> StateStore for CachingKeyValueStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.context = Some(context.clone());
        self.inner.init(context)
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_dirty()?;
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        let flushed = self.flush_dirty();
        self.dirty.clear();
        let closed = self.inner.close();
        flushed.and(closed)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn persistent(&self) -> bool {
        self.inner.persistent()
    }

    fn caching(&mut self) -> Option<&mut dyn CachedStateStore> {
        Some(self)
    }
}

impl<S: KeyValueBytesStore> CachedStateStore for CachingKeyValueStore<S> {
    fn set_flush_listener(&mut self, listener: RawFlushListener, send_old_values: bool) -> bool {
        self.listener = Some(listener);
        self.send_old_values = send_old_values;
        true
    }
}

impl<S: KeyValueBytesStore> KeyValueBytesStore for CachingKeyValueStore<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.dirty.get(key) {
            Some(entry) => Ok(entry.value.clone()),
            None => self.inner.get(key),
        }
    }

    fn put(&mut self, key: Bytes, value: Option<Bytes>) -> Result<()> {
        self.buffer(key, value)
    }

    fn put_if_absent(&mut self, key: Bytes, value: Bytes) -> Result<Option<Bytes>> {
        let existing = self.get(&key)?;
        if existing.is_none() {
            self.buffer(key, Some(value))?;
        }
        Ok(existing)
    }

    fn put_all(&mut self, entries: Vec<KeyValue<Bytes, Option<Bytes>>>) -> Result<()> {
        for entry in entries {
            self.buffer(entry.key, entry.value)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let existing = self.get(key)?;
        self.buffer(key.to_vec(), None)?;
        Ok(existing)
    }

    fn range(&self, from: &[u8], to: &[u8]) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        if from > to {
            return Ok(Box::new(SnapshotIterator::new(Vec::new())));
        }
        let dirty = self
            .dirty
            .range(from.to_vec()..=to.to_vec())
            .map(|(k, e)| (k.clone(), e.value.clone()));
        self.merged(self.inner.range(from, to)?, dirty)
    }

    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        let dirty = self.dirty.iter().map(|(k, e)| (k.clone(), e.value.clone()));
        self.merged(self.inner.all()?, dirty)
    }

    fn approximate_num_entries(&self) -> u64 {
        self.inner
            .approximate_num_entries()
            .saturating_add(self.dirty.len() as u64)
    }
}

impl<S: KeyValueBytesStore + fmt::Debug> fmt::Debug for CachingKeyValueStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingKeyValueStore")
            .field("inner", &self.inner)
            .field("dirty", &self.dirty.len())
            .field("max_dirty_entries", &self.max_dirty_entries)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryKeyValueStore;
    use crate::testing::RecordingKeyValueStore;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn open_store(max: usize) -> (CachingKeyValueStore<InMemoryKeyValueStore>, ProcessorContext) {
        let context = ProcessorContext::builder("app").build();
        let mut store =
            CachingKeyValueStore::with_max_dirty_entries(InMemoryKeyValueStore::new("cache"), max);
        store.init(&context).unwrap();
        (store, context)
    }

    fn capture(store: &mut CachingKeyValueStore<InMemoryKeyValueStore>, old: bool) -> Arc<Mutex<Vec<FlushEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        assert!(store.set_flush_listener(
            Box::new(move |event| {
                sink.lock().push(event);
                Ok(())
            }),
            old,
        ));
        events
    }

    #[test]
    fn test_reads_see_buffered_writes() {
        let (mut store, _) = open_store(10);
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.inner().get(b"a").unwrap(), None);
        assert_eq!(store.dirty_entries(), 1);
    }

    #[test]
    fn test_flush_writes_through_and_emits_events() {
        let (mut store, context) = open_store(10);
        let events = capture(&mut store, true);
        store.inner.put(b"a".to_vec(), Some(b"old".to_vec())).unwrap();

        context.set_record_timestamp(77);
        store.put(b"a".to_vec(), Some(b"new".to_vec())).unwrap();
        store.flush().unwrap();

        assert_eq!(store.inner().get(b"a").unwrap(), Some(b"new".to_vec()));
        let events = events.lock();
        assert_eq!(
            *events,
            vec![FlushEvent {
                key: b"a".to_vec(),
                new_value: Some(b"new".to_vec()),
                old_value: Some(b"old".to_vec()),
                timestamp: 77,
            }]
        );
    }

    #[test]
    fn test_old_values_only_when_requested() {
        let (mut store, _) = open_store(10);
        let events = capture(&mut store, false);
        store.inner.put(b"a".to_vec(), Some(b"old".to_vec())).unwrap();
        store.put(b"a".to_vec(), Some(b"new".to_vec())).unwrap();
        store.flush().unwrap();
        assert_eq!(events.lock()[0].old_value, None);
    }

    #[test]
    fn test_write_through_when_full() {
        let (mut store, _) = open_store(2);
        let events = capture(&mut store, false);
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        store.put(b"b".to_vec(), Some(b"2".to_vec())).unwrap();
        assert!(events.lock().is_empty());
        store.put(b"c".to_vec(), Some(b"3".to_vec())).unwrap();
        assert_eq!(events.lock().len(), 3);
        assert_eq!(store.dirty_entries(), 0);
    }

    #[test]
    fn test_buffered_delete_hides_key_in_range() {
        let (mut store, _) = open_store(10);
        store.inner.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        store.inner.put(b"b".to_vec(), Some(b"2".to_vec())).unwrap();
        assert_eq!(store.delete(b"a").unwrap(), Some(b"1".to_vec()));
        store.put(b"c".to_vec(), Some(b"3".to_vec())).unwrap();

        let keys: Vec<Bytes> = store.all().unwrap().map(|kv| kv.unwrap().key).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
        let keys: Vec<Bytes> = store
            .range(b"a", b"b")
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(keys, vec![b"b".to_vec()]);
    }

    #[test]
    fn test_listener_error_aborts_flush() {
        let (mut store, _) = open_store(10);
        store.set_flush_listener(
            Box::new(|_| Err(strata_core::StreamsError::config("bad codec"))),
            false,
        );
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        store.put(b"b".to_vec(), Some(b"2".to_vec())).unwrap();
        assert!(store.flush().is_err());
        assert_eq!(store.dirty_entries(), 1);
    }

    #[test]
    fn test_failed_write_through_keeps_entry_buffered() {
        let context = ProcessorContext::builder("app").build();
        let raw = RecordingKeyValueStore::new("cache");
        let calls = raw.calls();
        let mut store = CachingKeyValueStore::with_max_dirty_entries(raw, 10);
        store.init(&context).unwrap();
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();

        calls.fail_puts(true);
        assert!(store.flush().is_err());
        assert_eq!(store.dirty_entries(), 1);
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));

        calls.fail_puts(false);
        store.flush().unwrap();
        assert_eq!(store.dirty_entries(), 0);
        assert_eq!(store.inner().get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_caching_capability() {
        let (mut store, _) = open_store(10);
        assert!(store.caching().is_some());
    }
}
