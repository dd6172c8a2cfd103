//! In-memory key/value store
//!
//! Ordered map of raw keys to raw values. Iterators are snapshots taken at
//! the time of the call, so later writes are not visible through them.

use std::collections::BTreeMap;

use strata_core::iter::SnapshotIterator;
use strata_core::traits::{KeyValueBytesStore, KeyValueIter, StateStore};
use strata_core::{Bytes, KeyValue, ProcessorContext, Result};
use tracing::{debug, warn};

/// BTreeMap-backed raw key/value store.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    name: String,
    map: BTreeMap<Bytes, Bytes>,
    open: bool,
}

impl InMemoryKeyValueStore {
    /// Create a closed store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: BTreeMap::new(),
            open: false,
        }
    }

    fn snapshot<'a>(entries: impl Iterator<Item = (&'a Bytes, &'a Bytes)>) -> KeyValueIter<'static, Bytes, Bytes> {
        let entries = entries
            .map(|(k, v)| KeyValue::pair(k.clone(), v.clone()))
            .collect();
        Box::new(SnapshotIterator::new(entries))
    }
}

impl StateStore for InMemoryKeyValueStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.open = true;
        debug!(
            target: "strata::storage",
            store = %self.name,
            task_id = %context.task_id(),
            "Opened in-memory store"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.map.clear();
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn persistent(&self) -> bool {
        false
    }
}

impl KeyValueBytesStore for InMemoryKeyValueStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: Bytes, value: Option<Bytes>) -> Result<()> {
        match value {
            Some(value) => {
                self.map.insert(key, value);
            }
            None => {
                self.map.remove(&key);
            }
        }
        Ok(())
    }

    fn put_if_absent(&mut self, key: Bytes, value: Bytes) -> Result<Option<Bytes>> {
        if let Some(existing) = self.map.get(&key) {
            return Ok(Some(existing.clone()));
        }
        self.map.insert(key, value);
        Ok(None)
    }

    fn put_all(&mut self, entries: Vec<KeyValue<Bytes, Option<Bytes>>>) -> Result<()> {
        for entry in entries {
            self.put(entry.key, entry.value)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.remove(key))
    }

    fn range(&self, from: &[u8], to: &[u8]) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        if from > to {
            warn!(
                target: "strata::storage",
                store = %self.name,
                "Returning empty iterator for range with from key greater than to key"
            );
            return Ok(Box::new(SnapshotIterator::new(Vec::new())));
        }
        Ok(Self::snapshot(self.map.range(from.to_vec()..=to.to_vec())))
    }

    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        Ok(Self::snapshot(self.map.iter()))
    }

    fn approximate_num_entries(&self) -> u64 {
        self.map.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> InMemoryKeyValueStore {
        let mut store = InMemoryKeyValueStore::new("mem");
        store.init(&ProcessorContext::builder("app").build()).unwrap();
        store
    }

    fn keys(iter: KeyValueIter<'_, Bytes, Bytes>) -> Vec<Bytes> {
        iter.map(|kv| kv.unwrap().key).collect()
    }

    #[test]
    fn test_put_get_delete() {
        let mut store = open_store();
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.delete(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_put_none_deletes() {
        let mut store = open_store();
        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        store.put(b"a".to_vec(), None).unwrap();
        assert_eq!(store.approximate_num_entries(), 0);
    }

    #[test]
    fn test_put_if_absent() {
        let mut store = open_store();
        assert_eq!(store.put_if_absent(b"a".to_vec(), b"1".to_vec()).unwrap(), None);
        assert_eq!(
            store.put_if_absent(b"a".to_vec(), b"2".to_vec()).unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_range_is_inclusive_and_ordered() {
        let mut store = open_store();
        for key in [b"d", b"a", b"c", b"b"] {
            store.put(key.to_vec(), Some(b"v".to_vec())).unwrap();
        }
        assert_eq!(
            keys(store.range(b"b", b"c").unwrap()),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(keys(store.all().unwrap()).len(), 4);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let mut store = open_store();
        store.put(b"a".to_vec(), Some(b"v".to_vec())).unwrap();
        assert!(keys(store.range(b"z", b"a").unwrap()).is_empty());
    }

    #[test]
    fn test_close_clears() {
        let mut store = open_store();
        store.put(b"a".to_vec(), Some(b"v".to_vec())).unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert_eq!(store.approximate_num_entries(), 0);
    }
}
