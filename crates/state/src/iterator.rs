//! Decoding iterators that record their lifetime on close
//!
//! A metered range or scan records one observation on the operation's
//! sensor: the time between opening the iterator and closing it. Closing
//! happens explicitly through [`KeyValueIterator::close`] or implicitly
//! when the iterator is dropped, whichever comes first.

use std::sync::Arc;

use strata_core::traits::KeyValueIterator;
use strata_core::{Bytes, Clock, KeyValue, Result, Sensor};

type Decoder<'a, RK, K, V> = Box<dyn Fn(KeyValue<RK, Bytes>) -> Result<KeyValue<K, V>> + 'a>;

/// Iterator decoding raw entries into typed ones.
pub struct MeteredIterator<'a, RK, K, V> {
    inner: Box<dyn KeyValueIterator<RK, Bytes> + 'a>,
    decode: Decoder<'a, RK, K, V>,
    sensor: Arc<Sensor>,
    clock: Arc<dyn Clock>,
    start_ns: i64,
    open: bool,
}

impl<'a, RK, K, V> MeteredIterator<'a, RK, K, V> {
    /// Wrap `inner`; the open time is taken now.
    pub fn new(
        inner: Box<dyn KeyValueIterator<RK, Bytes> + 'a>,
        decode: impl Fn(KeyValue<RK, Bytes>) -> Result<KeyValue<K, V>> + 'a,
        sensor: Arc<Sensor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let start_ns = clock.nanoseconds();
        Self {
            inner,
            decode: Box::new(decode),
            sensor,
            clock,
            start_ns,
            open: true,
        }
    }
}

impl<'a, RK, K, V> Iterator for MeteredIterator<'a, RK, K, V> {
    type Item = Result<KeyValue<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }
        let entry = self.inner.next()?;
        Some(entry.and_then(|raw| (self.decode)(raw)))
    }
}

impl<'a, RK, K, V> KeyValueIterator<K, V> for MeteredIterator<'a, RK, K, V> {
    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.inner.close();
        if self.sensor.should_record() {
            let elapsed_ns = self.clock.nanoseconds() - self.start_ns;
            self.sensor.record(elapsed_ns as f64, self.clock.milliseconds());
        }
    }
}

impl<'a, RK, K, V> Drop for MeteredIterator<'a, RK, K, V> {
    fn drop(&mut self) {
        self.close();
    }
}
