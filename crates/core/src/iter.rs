//! Materialized iterators
//!
//! Stores whose backing structure cannot lend a cursor across calls hand
//! out a snapshot of the matching entries instead.

use crate::error::Result;
use crate::traits::KeyValueIterator;
use crate::types::KeyValue;

/// Iterator over entries collected up front.
#[derive(Debug)]
pub struct SnapshotIterator<K, V> {
    entries: std::vec::IntoIter<Result<KeyValue<K, V>>>,
    open: bool,
}

impl<K, V> SnapshotIterator<K, V> {
    /// Iterate over `entries` in the given order.
    pub fn new(entries: Vec<KeyValue<K, V>>) -> Self {
        Self::from_results(entries.into_iter().map(Ok).collect())
    }

    /// Iterate over pre-computed results, errors included.
    pub fn from_results(entries: Vec<Result<KeyValue<K, V>>>) -> Self {
        Self {
            entries: entries.into_iter(),
            open: true,
        }
    }

    /// True until closed.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl<K, V> Iterator for SnapshotIterator<K, V> {
    type Item = Result<KeyValue<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }
        self.entries.next()
    }
}

impl<K, V> KeyValueIterator<K, V> for SnapshotIterator<K, V> {
    fn close(&mut self) {
        self.open = false;
        self.entries = Vec::new().into_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_in_order_then_ends() {
        let mut iter = SnapshotIterator::new(vec![KeyValue::pair(1, "a"), KeyValue::pair(2, "b")]);
        assert_eq!(iter.next().unwrap().unwrap(), KeyValue::pair(1, "a"));
        assert_eq!(iter.next().unwrap().unwrap(), KeyValue::pair(2, "b"));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_close_early() {
        let mut iter = SnapshotIterator::new(vec![KeyValue::pair(1, "a"), KeyValue::pair(2, "b")]);
        iter.next();
        iter.close();
        assert!(!iter.is_open());
        assert!(iter.next().is_none());
    }
}
