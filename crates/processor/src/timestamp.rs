//! Timestamp extraction policies
//!
//! The source node only carries its extractor; the ingestion pipeline
//! calls it to pick the timestamp of each consumed record.

use std::sync::Arc;

use strata_core::{Clock, SystemClock};

use crate::record::ConsumerRecord;

/// Chooses the timestamp of a consumed record.
pub trait TimestampExtractor: Send + Sync {
    /// Timestamp of `record`; `partition_time` is the highest timestamp
    /// extracted so far on the record's partition.
    fn extract(&self, record: &ConsumerRecord, partition_time: i64) -> i64;
}

/// Uses the timestamp carried by the record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTimestampExtractor;

impl TimestampExtractor for RecordTimestampExtractor {
    fn extract(&self, record: &ConsumerRecord, _partition_time: i64) -> i64 {
        record.timestamp
    }
}

/// Uses the current wall-clock time.
pub struct WallclockTimestampExtractor {
    clock: Arc<dyn Clock>,
}

impl WallclockTimestampExtractor {
    /// Extractor reading `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for WallclockTimestampExtractor {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

impl TimestampExtractor for WallclockTimestampExtractor {
    fn extract(&self, _record: &ConsumerRecord, _partition_time: i64) -> i64 {
        self.clock.milliseconds()
    }
}
