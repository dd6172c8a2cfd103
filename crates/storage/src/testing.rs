//! Test doubles for the layers above the raw stores
//!
//! - [`RecordingKeyValueStore`]: in-memory store that counts calls and can
//!   be told to fail
//! - [`FailingMetricsRegistry`]: registry whose sensor removal fails
//!
//! # Example
//!
//! ```
//! use strata_storage::testing::RecordingKeyValueStore;
//!
//! let store = RecordingKeyValueStore::new("counts");
//! let calls = store.calls();
//! calls.fail_puts(true);
//! assert_eq!(calls.puts(), 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use strata_core::metrics::{InMemoryMetricsRegistry, MetricName, MetricsRegistry, RecordingLevel, Sensor};
use strata_core::traits::{KeyValueBytesStore, KeyValueIter, StateStore};
use strata_core::{Bytes, KeyValue, ProcessorContext, Result, StreamsError};

use crate::memory::InMemoryKeyValueStore;

/// Shared call counters and failure switches of a [`RecordingKeyValueStore`].
#[derive(Debug, Default)]
pub struct StoreCalls {
    inits: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_close: AtomicBool,
}

impl StoreCalls {
    /// Number of `init` calls.
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Number of write calls (`put`, `put_if_absent`, each `put_all` entry).
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `get` calls.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `flush` calls.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make writes fail with a storage error.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make reads fail with a storage error.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make `close` fail after releasing the store.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StreamsError::Storage(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

/// In-memory store that records calls.
#[derive(Debug)]
pub struct RecordingKeyValueStore {
    inner: InMemoryKeyValueStore,
    calls: Arc<StoreCalls>,
}

impl RecordingKeyValueStore {
    /// Create a closed store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: InMemoryKeyValueStore::new(name),
            calls: Arc::new(StoreCalls::default()),
        }
    }

    /// Handle on the call counters; stays valid after the store is moved.
    pub fn calls(&self) -> Arc<StoreCalls> {
        Arc::clone(&self.calls)
    }
}

impl StateStore for RecordingKeyValueStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        StoreCalls::count(&self.calls.inits);
        self.inner.init(context)
    }

    fn flush(&mut self) -> Result<()> {
        StoreCalls::count(&self.calls.flushes);
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        StoreCalls::count(&self.calls.closes);
        self.inner.close()?;
        StoreCalls::check(&self.calls.fail_close, "close")
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn persistent(&self) -> bool {
        false
    }
}

impl KeyValueBytesStore for RecordingKeyValueStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        StoreCalls::count(&self.calls.gets);
        StoreCalls::check(&self.calls.fail_gets, "get")?;
        self.inner.get(key)
    }

    fn put(&mut self, key: Bytes, value: Option<Bytes>) -> Result<()> {
        StoreCalls::count(&self.calls.puts);
        StoreCalls::check(&self.calls.fail_puts, "put")?;
        self.inner.put(key, value)
    }

    fn put_if_absent(&mut self, key: Bytes, value: Bytes) -> Result<Option<Bytes>> {
        StoreCalls::count(&self.calls.puts);
        StoreCalls::check(&self.calls.fail_puts, "put")?;
        self.inner.put_if_absent(key, value)
    }

    fn put_all(&mut self, entries: Vec<KeyValue<Bytes, Option<Bytes>>>) -> Result<()> {
        for entry in entries {
            self.put(entry.key, entry.value)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        StoreCalls::count(&self.calls.deletes);
        StoreCalls::check(&self.calls.fail_puts, "delete")?;
        self.inner.delete(key)
    }

    fn range(&self, from: &[u8], to: &[u8]) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        StoreCalls::check(&self.calls.fail_gets, "range")?;
        self.inner.range(from, to)
    }

    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>> {
        StoreCalls::check(&self.calls.fail_gets, "all")?;
        self.inner.all()
    }

    fn approximate_num_entries(&self) -> u64 {
        self.inner.approximate_num_entries()
    }
}

/// Registry whose `remove_sensor` always fails.
///
/// Sensors are still created and recorded normally.
pub struct FailingMetricsRegistry {
    inner: InMemoryMetricsRegistry,
    removals: AtomicUsize,
}

impl FailingMetricsRegistry {
    /// Registry recording at `level`.
    pub fn new(level: RecordingLevel) -> Self {
        Self {
            inner: InMemoryMetricsRegistry::new(level),
            removals: AtomicUsize::new(0),
        }
    }

    /// Number of attempted removals.
    pub fn removal_attempts(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl MetricsRegistry for FailingMetricsRegistry {
    fn recording_level(&self) -> RecordingLevel {
        self.inner.recording_level()
    }

    fn sensor(&self, name: &str, level: RecordingLevel, parents: &[Arc<Sensor>]) -> Arc<Sensor> {
        self.inner.sensor(name, level, parents)
    }

    fn get_sensor(&self, name: &str) -> Option<Arc<Sensor>> {
        self.inner.get_sensor(name)
    }

    fn remove_sensor(&self, name: &str) -> Result<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        Err(StreamsError::InvalidOperation(format!(
            "injected failure removing sensor {}",
            name
        )))
    }

    fn metric_value(&self, name: &MetricName) -> Option<f64> {
        self.inner.metric_value(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_injected_failures() {
        let mut store = RecordingKeyValueStore::new("rec");
        let calls = store.calls();
        store.init(&ProcessorContext::builder("app").build()).unwrap();

        store.put(b"a".to_vec(), Some(b"1".to_vec())).unwrap();
        calls.fail_puts(true);
        assert!(store.put(b"b".to_vec(), Some(b"2".to_vec())).is_err());
        assert_eq!(calls.puts(), 2);
        assert_eq!(store.get(b"b").unwrap(), None);
        assert_eq!(calls.gets(), 1);
    }

    #[test]
    fn test_failing_close_still_releases() {
        let mut store = RecordingKeyValueStore::new("rec");
        let calls = store.calls();
        store.init(&ProcessorContext::builder("app").build()).unwrap();
        calls.fail_close(true);
        assert!(store.close().is_err());
        assert!(!store.is_open());
        assert_eq!(calls.closes(), 1);
    }

    #[test]
    fn test_failing_registry() {
        let registry = FailingMetricsRegistry::new(RecordingLevel::Debug);
        registry.sensor("s", RecordingLevel::Debug, &[]);
        assert!(registry.remove_sensor("s").is_err());
        assert!(registry.get_sensor("s").is_some());
        assert_eq!(registry.removal_attempts(), 1);
    }
}
