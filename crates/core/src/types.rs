//! Core types for the state-store layer
//!
//! This module defines the foundational types:
//! - Bytes: raw key/value encoding handed to the storage engine
//! - KeyValue: a key/value pair produced by store iterators
//! - Headers: record headers passed to codecs
//! - TaskId: identity of the processing task owning a store
//! - TimeWindow / Windowed: windowed keys at the typed API boundary
//! - ValueAndTimestamp: a value carrying the timestamp of its last update

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw byte encoding of a key or value
///
/// Raw keys compare lexicographically, which is the order the raw stores
/// iterate in.
pub type Bytes = Vec<u8>;

/// A key/value pair yielded by store iterators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<K, V> {
    /// The key
    pub key: K,
    /// The value
    pub value: V,
}

impl<K, V> KeyValue<K, V> {
    /// Create a new pair
    pub fn pair(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// Ordered record headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<u8>)>,
}

impl Headers {
    /// Create empty headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header; duplicate keys are kept in insertion order
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Last value added under `key`
    pub fn last_header(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity of a processing task: topic group and partition
///
/// Displayed as `<topic_group>_<partition>`, which is the form used in
/// metric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Sub-topology the task belongs to
    pub topic_group: u32,
    /// Input partition the task processes
    pub partition: u32,
}

impl TaskId {
    /// Create a task id
    pub const fn new(topic_group: u32, partition: u32) -> Self {
        Self {
            topic_group,
            partition,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.topic_group, self.partition)
    }
}

/// A fixed-size time window `[start, end)` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    start_ms: i64,
    end_ms: i64,
}

impl TimeWindow {
    /// Create a window starting at `start_ms` with the given size
    ///
    /// The end saturates at `i64::MAX` for windows that would overflow.
    pub fn of_size(start_ms: i64, size_ms: i64) -> Self {
        Self {
            start_ms,
            end_ms: start_ms.saturating_add(size_ms),
        }
    }

    /// Window start (inclusive)
    #[inline]
    pub const fn start(&self) -> i64 {
        self.start_ms
    }

    /// Window end (exclusive)
    #[inline]
    pub const fn end(&self) -> i64 {
        self.end_ms
    }
}

/// A logical key scoped to a window
///
/// Equality is component-wise. Windowed keys only exist at the typed API
/// boundary; the raw store sees `encode(key) ++ be64(window start)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Windowed<K> {
    key: K,
    window: TimeWindow,
}

impl<K> Windowed<K> {
    /// Create a windowed key
    pub fn new(key: K, window: TimeWindow) -> Self {
        Self { key, window }
    }

    /// The logical key
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The window
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Split into key and window
    pub fn into_parts(self) -> (K, TimeWindow) {
        (self.key, self.window)
    }
}

impl<K: fmt::Display> fmt::Display for Windowed<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}@{}/{}]",
            self.key,
            self.window.start(),
            self.window.end()
        )
    }
}

/// A value together with the timestamp of the record that last updated it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAndTimestamp<V> {
    value: V,
    timestamp: i64,
}

impl<V> ValueAndTimestamp<V> {
    /// Pair a value with its timestamp
    pub fn make(value: V, timestamp: i64) -> Self {
        Self { value, timestamp }
    }

    /// The value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The timestamp in milliseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Consume and return the value
    pub fn into_value(self) -> V {
        self.value
    }
}
