//! Window store over a flat key/value store
//!
//! Each window entry is stored under `key ++ be64(window_start)`. For one
//! key, entries are adjacent and ordered by window start, so a single-key
//! time-range fetch is a contiguous range scan. Multi-key fetches scan and
//! filter by decoded key and window start.

use strata_core::iter::SnapshotIterator;
use strata_core::traits::{
    CachedStateStore, KeyValueBytesStore, KeyValueIter, StateStore, WindowBytesStore,
    WindowStoreIter,
};
use strata_core::window_key::WindowKeySchema;
use strata_core::{Bytes, KeyValue, ProcessorContext, Result};

/// Raw window store laid out over `S`.
#[derive(Debug)]
pub struct KeyValueWindowStore<S> {
    inner: S,
}

impl<S: KeyValueBytesStore> KeyValueWindowStore<S> {
    /// Lay a window store over `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The flat store below.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn filtered(
        iter: KeyValueIter<'_, Bytes, Bytes>,
        keep: impl Fn(&[u8], i64) -> bool,
    ) -> Result<KeyValueIter<'static, Bytes, Bytes>> {
        let mut entries = Vec::new();
        for entry in iter {
            let entry = entry?;
            let key = WindowKeySchema::extract_store_key_bytes(&entry.key)?;
            let start = WindowKeySchema::extract_store_timestamp(&entry.key)?;
            if keep(key, start) {
                entries.push(entry);
            }
        }
        Ok(Box::new(SnapshotIterator::new(entries)))
    }
}

impl<S: KeyValueBytesStore> StateStore for KeyValueWindowStore<S> {
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

impl<S: KeyValueBytesStore> WindowBytesStore for KeyValueWindowStore<S> {
    fn put(&mut self, key: &[u8], value: Option<Bytes>, window_start_ms: i64) -> Result<()> {
        self.inner
            .put(WindowKeySchema::to_store_key_binary(key, window_start_ms), value)
    }

    fn fetch(&self, key: &[u8], window_start_ms: i64) -> Result<Option<Bytes>> {
        self.inner
            .get(&WindowKeySchema::to_store_key_binary(key, window_start_ms))
    }

    fn fetch_range(&self, key: &[u8], time_from: i64, time_to: i64) -> Result<WindowStoreIter<'_, Bytes>> {
        // Window starts are non-negative; a negative bound would encode
        // above every positive start.
        let time_from = time_from.max(0);
        if time_from > time_to {
            return Ok(Box::new(SnapshotIterator::new(Vec::new())));
        }
        let from = WindowKeySchema::to_store_key_binary(key, time_from);
        let to = WindowKeySchema::to_store_key_binary(key, time_to);
        let mut windows = Vec::new();
        for entry in self.inner.range(&from, &to)? {
            let entry = entry?;
            if WindowKeySchema::extract_store_key_bytes(&entry.key)? != key {
                continue;
            }
            let start = WindowKeySchema::extract_store_timestamp(&entry.key)?;
            if (time_from..=time_to).contains(&start) {
                windows.push(KeyValue::pair(start, entry.value));
            }
        }
        Ok(Box::new(SnapshotIterator::new(windows)))
    }

    fn fetch_key_range(
        &self,
        from: &[u8],
        to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        Self::filtered(self.inner.all()?, |key, start| {
            from <= key && key <= to && (time_from..=time_to).contains(&start)
        })
    }

    fn fetch_all(&self, time_from: i64, time_to: i64) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        Self::filtered(self.inner.all()?, |_, start| {
            (time_from..=time_to).contains(&start)
        })
    }

    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        self.inner.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryKeyValueStore;

    fn open_store() -> KeyValueWindowStore<InMemoryKeyValueStore> {
        let mut store = KeyValueWindowStore::new(InMemoryKeyValueStore::new("win"));
        store.init(&ProcessorContext::builder("app").build()).unwrap();
        store
    }

    #[test]
    fn test_fetch_point() {
        let mut store = open_store();
        store.put(b"k1", Some(b"v1".to_vec()), 1_000).unwrap();
        assert_eq!(store.fetch(b"k1", 1_000).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.fetch(b"k1", 999).unwrap(), None);
    }

    #[test]
    fn test_fetch_range_bounds_and_order() {
        let mut store = open_store();
        for start in [300, 100, 200, 400] {
            store
                .put(b"k", Some(start.to_string().into_bytes()), start)
                .unwrap();
        }
        store.put(b"k2", Some(b"other".to_vec()), 200).unwrap();

        let starts: Vec<i64> = store
            .fetch_range(b"k", 150, 300)
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(starts, vec![200, 300]);
        assert_eq!(store.fetch_range(b"k", 301, 300).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_range_with_negative_lower_bound() {
        let mut store = open_store();
        store.put(b"k1", Some(b"v1".to_vec()), 1_000).unwrap();
        store.put(b"k1", Some(b"v0".to_vec()), 0).unwrap();

        let starts: Vec<i64> = store
            .fetch_range(b"k1", -1, 2_000)
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(starts, vec![0, 1_000]);
        assert_eq!(store.fetch_range(b"k1", -60_000, -1).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_key_range_yields_store_keys() {
        let mut store = open_store();
        store.put(b"a", Some(b"1".to_vec()), 10).unwrap();
        store.put(b"b", Some(b"2".to_vec()), 20).unwrap();
        store.put(b"c", Some(b"3".to_vec()), 30).unwrap();

        let keys: Vec<Bytes> = store
            .fetch_key_range(b"a", b"b", 0, 100)
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(
            keys,
            vec![
                WindowKeySchema::to_store_key_binary(b"a", 10),
                WindowKeySchema::to_store_key_binary(b"b", 20),
            ]
        );
        assert_eq!(store.fetch_all(15, 30).unwrap().count(), 2);
        assert_eq!(WindowBytesStore::all(&store).unwrap().count(), 3);
    }

    #[test]
    fn test_put_none_deletes_window() {
        let mut store = open_store();
        store.put(b"k", Some(b"v".to_vec()), 5).unwrap();
        store.put(b"k", None, 5).unwrap();
        assert_eq!(store.fetch(b"k", 5).unwrap(), None);
    }
}
