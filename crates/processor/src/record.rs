//! Records flowing into and through processor nodes

use strata_core::{Bytes, Headers};

/// A record as read from a source topic, before deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: u32,
    /// Offset within the partition
    pub offset: i64,
    /// Timestamp carried by the record
    pub timestamp: i64,
    /// Record headers
    pub headers: Headers,
    /// Raw key; `None` for a null key
    pub key: Option<Bytes>,
    /// Raw value; `None` for a tombstone
    pub value: Option<Bytes>,
}

impl ConsumerRecord {
    /// Record on partition 0 at offset 0 and timestamp 0, without headers.
    pub fn new(topic: impl Into<String>, key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            timestamp: 0,
            headers: Headers::new(),
            key,
            value,
        }
    }

    /// Set the record timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set partition and offset.
    pub fn with_position(mut self, partition: u32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Set the headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// A typed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<K, V> {
    /// Key; `None` for a null key
    pub key: Option<K>,
    /// Value; `None` for a tombstone
    pub value: Option<V>,
    /// Record timestamp
    pub timestamp: i64,
    /// Record headers
    pub headers: Headers,
}

impl<K, V> Record<K, V> {
    /// Record with a key and value at `timestamp`, without headers.
    pub fn new(key: K, value: V, timestamp: i64) -> Self {
        Self {
            key: Some(key),
            value: Some(value),
            timestamp,
            headers: Headers::new(),
        }
    }
}
