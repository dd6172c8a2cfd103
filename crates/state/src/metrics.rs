//! Store-level sensors
//!
//! One sensor per operation and store, at `DEBUG` level, carrying
//! `<op>-rate`, `<op>-total`, `<op>-latency-avg` and `<op>-latency-max` in
//! the `stream-state-metrics` group.

use std::collections::HashMap;
use std::sync::Arc;

use strata_core::metrics::{RecordingLevel, Sensor, StreamsMetrics, STATE_STORE_LEVEL_GROUP};

/// `put`
pub const PUT: &str = "put";
/// `put-if-absent`
pub const PUT_IF_ABSENT: &str = "put-if-absent";
/// `put-all`
pub const PUT_ALL: &str = "put-all";
/// `get`
pub const GET: &str = "get";
/// `fetch`
pub const FETCH: &str = "fetch";
/// `delete`
pub const DELETE: &str = "delete";
/// `range`
pub const RANGE: &str = "range";
/// `all`
pub const ALL: &str = "all";
/// `flush`
pub const FLUSH: &str = "flush";
/// `restore`: timing of the wrapped store's `init`
pub const RESTORE: &str = "restore";

/// Identity of a store in metric names and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreScope {
    /// Owning worker thread
    pub thread_id: String,
    /// Owning task, as displayed
    pub task_id: String,
    /// Store name
    pub store_name: String,
    /// Store type, used as the `<type>-state-id` tag
    pub metrics_scope: String,
}

/// Create (or look up) the sensor for `operation` and attach its metrics.
pub fn store_sensor(metrics: &StreamsMetrics, scope: &StoreScope, operation: &str) -> Arc<Sensor> {
    let sensor = metrics.store_level_sensor(
        &scope.thread_id,
        &scope.task_id,
        &scope.store_name,
        operation,
        RecordingLevel::Debug,
        &[],
    );
    let tags = StreamsMetrics::store_level_tags(
        &scope.thread_id,
        &scope.task_id,
        &scope.metrics_scope,
        &scope.store_name,
    );
    StreamsMetrics::add_invocation_rate_and_count(&sensor, STATE_STORE_LEVEL_GROUP, &tags, operation);
    StreamsMetrics::add_avg_and_max_latency(&sensor, STATE_STORE_LEVEL_GROUP, &tags, operation);
    sensor
}

/// Sensors of one store, by operation.
#[derive(Debug, Default)]
pub struct StoreSensors {
    sensors: HashMap<&'static str, Arc<Sensor>>,
}

impl StoreSensors {
    /// Create the sensors for `operations`.
    pub fn register(metrics: &StreamsMetrics, scope: &StoreScope, operations: &[&'static str]) -> Self {
        let sensors = operations
            .iter()
            .map(|op| (*op, store_sensor(metrics, scope, op)))
            .collect();
        Self { sensors }
    }

    /// Sensor of `operation`, if registered.
    pub fn get(&self, operation: &str) -> Option<&Arc<Sensor>> {
        self.sensors.get(operation)
    }
}
