//! Sensors, metric naming, and latency measurement
//!
//! The metrics registry is a collaborator shared by every task thread of
//! an application. Stores and processor nodes never synchronize among
//! themselves; they register sensors under thread- and task-tagged names so
//! observations from many threads land in distinct sensors and aggregate
//! in the registry.
//!
//! # Layers
//!
//! - [`Sensor`]: records observations into its stats and its parents
//! - [`MetricsRegistry`]: get-or-create/remove sensors (external seam)
//! - [`InMemoryMetricsRegistry`]: default registry backed by `DashMap`
//! - [`StreamsMetrics`]: naming and tagging conventions for store-, node-
//!   and task-level sensors, and bulk removal per scope

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, StreamsError};
use crate::time::Clock;

/// Group of store-level metrics.
pub const STATE_STORE_LEVEL_GROUP: &str = "stream-state-metrics";
/// Group of processor-node-level metrics.
pub const PROCESSOR_NODE_LEVEL_GROUP: &str = "stream-processor-node-metrics";
/// Group of task-level metrics.
pub const TASK_LEVEL_GROUP: &str = "stream-task-metrics";
/// Thread id tag.
pub const THREAD_ID_TAG: &str = "thread-id";
/// Task id tag.
pub const TASK_ID_TAG: &str = "task-id";
/// Processor node id tag.
pub const PROCESSOR_NODE_ID_TAG: &str = "processor-node-id";

/// Suffix of invocation rate metrics.
pub const RATE_SUFFIX: &str = "-rate";
/// Suffix of invocation count metrics.
pub const TOTAL_SUFFIX: &str = "-total";
/// Suffix of average latency metrics.
pub const LATENCY_AVG_SUFFIX: &str = "-latency-avg";
/// Suffix of maximum latency metrics.
pub const LATENCY_MAX_SUFFIX: &str = "-latency-max";

// ============================================================================
// Recording level
// ============================================================================

/// Level at which a sensor records.
///
/// An `Info` sensor always records; a `Debug` sensor records only when the
/// registry is configured at `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordingLevel {
    /// Always recorded
    Info,
    /// Recorded only in debug mode
    Debug,
}

impl RecordingLevel {
    /// True if a sensor at this level records under `configured`.
    pub fn should_record(self, configured: RecordingLevel) -> bool {
        self <= configured
    }
}

impl FromStr for RecordingLevel {
    type Err = StreamsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INFO" => Ok(RecordingLevel::Info),
            "DEBUG" => Ok(RecordingLevel::Debug),
            other => Err(StreamsError::config(format!(
                "Invalid metrics recording level '{}'. Expected \"INFO\" or \"DEBUG\".",
                other
            ))),
        }
    }
}

// ============================================================================
// Metric names and sensors
// ============================================================================

/// Fully qualified metric name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricName {
    /// Metric name, e.g. `put-rate`
    pub name: String,
    /// Metric group, e.g. `stream-state-metrics`
    pub group: String,
    /// Tags identifying the metric's scope
    pub tags: BTreeMap<String, String>,
}

impl MetricName {
    /// Create a metric name.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            tags,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)?;
        for (k, v) in &self.tags {
            write!(f, ",{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Statistic a metric reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// Observations per second over the sample window
    Rate,
    /// Number of observations
    Total,
    /// Mean observed value
    Avg,
    /// Largest observed value
    Max,
}

#[derive(Debug, Default)]
struct SensorStats {
    count: u64,
    sum: f64,
    max: Option<f64>,
    first_ms: Option<i64>,
    last_ms: i64,
}

/// A named sink for observations.
///
/// Recording updates the sensor's own stats and then every parent's, so
/// a parent sensor aggregates all of its children.
pub struct Sensor {
    name: String,
    level: RecordingLevel,
    configured_level: RecordingLevel,
    sample_window_ms: i64,
    parents: Vec<Arc<Sensor>>,
    stats: Mutex<SensorStats>,
    metrics: Mutex<Vec<(MetricName, Stat)>>,
}

impl Sensor {
    /// Create a sensor.
    pub fn new(
        name: impl Into<String>,
        level: RecordingLevel,
        configured_level: RecordingLevel,
        sample_window_ms: i64,
        parents: Vec<Arc<Sensor>>,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            configured_level,
            sample_window_ms: sample_window_ms.max(1),
            parents,
            stats: Mutex::new(SensorStats::default()),
            metrics: Mutex::new(Vec::new()),
        }
    }

    /// Sensor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recording level of this sensor.
    pub fn level(&self) -> RecordingLevel {
        self.level
    }

    /// True if observations are recorded under the registry's level.
    pub fn should_record(&self) -> bool {
        self.level.should_record(self.configured_level)
    }

    /// Parent sensors.
    pub fn parents(&self) -> &[Arc<Sensor>] {
        &self.parents
    }

    /// Record one observation of `value` at `now_ms`.
    pub fn record(&self, value: f64, now_ms: i64) {
        if self.should_record() {
            let mut stats = self.stats.lock();
            stats.count += 1;
            stats.sum += value;
            stats.max = Some(stats.max.map_or(value, |m| m.max(value)));
            stats.first_ms.get_or_insert(now_ms);
            stats.last_ms = now_ms;
        }
        for parent in &self.parents {
            parent.record(value, now_ms);
        }
    }

    /// Number of recorded observations.
    pub fn count(&self) -> u64 {
        self.stats.lock().count
    }

    /// Attach a metric; returns false if the name is already attached.
    pub fn add_metric(&self, name: MetricName, stat: Stat) -> bool {
        let mut metrics = self.metrics.lock();
        if metrics.iter().any(|(n, _)| n == &name) {
            return false;
        }
        metrics.push((name, stat));
        true
    }

    /// Names of the attached metrics.
    pub fn metric_names(&self) -> Vec<MetricName> {
        self.metrics.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Current value of an attached metric.
    pub fn metric_value(&self, name: &MetricName) -> Option<f64> {
        let stat = self
            .metrics
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)?;
        let stats = self.stats.lock();
        let value = match stat {
            Stat::Total => stats.count as f64,
            Stat::Max => stats.max.unwrap_or(f64::NAN),
            Stat::Avg => {
                if stats.count == 0 {
                    f64::NAN
                } else {
                    stats.sum / stats.count as f64
                }
            }
            Stat::Rate => {
                let elapsed = stats
                    .first_ms
                    .map_or(0, |first| stats.last_ms.saturating_sub(first));
                let window_ms = elapsed.max(self.sample_window_ms);
                stats.count as f64 / (window_ms as f64 / 1_000.0)
            }
        };
        Some(value)
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("parents", &self.parents.len())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Shared sensor registry.
///
/// Implementations must be safe to call from every task thread.
pub trait MetricsRegistry: Send + Sync {
    /// Level at which sensors record.
    fn recording_level(&self) -> RecordingLevel;

    /// Get the sensor named `name`, creating it with `parents` if absent.
    ///
    /// An existing sensor is returned as is; `parents` are ignored for it.
    fn sensor(&self, name: &str, level: RecordingLevel, parents: &[Arc<Sensor>]) -> Arc<Sensor>;

    /// Look up a sensor.
    fn get_sensor(&self, name: &str) -> Option<Arc<Sensor>>;

    /// Remove a sensor and its metrics.
    fn remove_sensor(&self, name: &str) -> Result<()>;

    /// Current value of a metric, if registered.
    fn metric_value(&self, name: &MetricName) -> Option<f64>;
}

/// In-process registry.
pub struct InMemoryMetricsRegistry {
    level: RecordingLevel,
    sample_window_ms: i64,
    sensors: DashMap<String, Arc<Sensor>>,
}

impl InMemoryMetricsRegistry {
    /// Registry recording at `level` with a 30s rate window.
    pub fn new(level: RecordingLevel) -> Self {
        Self::with_sample_window(level, 30_000)
    }

    /// Registry with an explicit rate window.
    pub fn with_sample_window(level: RecordingLevel, sample_window_ms: i64) -> Self {
        Self {
            level,
            sample_window_ms,
            sensors: DashMap::new(),
        }
    }

    /// Number of registered sensors.
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

impl MetricsRegistry for InMemoryMetricsRegistry {
    fn recording_level(&self) -> RecordingLevel {
        self.level
    }

    fn sensor(&self, name: &str, level: RecordingLevel, parents: &[Arc<Sensor>]) -> Arc<Sensor> {
        self.sensors
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Sensor::new(
                    name,
                    level,
                    self.level,
                    self.sample_window_ms,
                    parents.to_vec(),
                ))
            })
            .clone()
    }

    fn get_sensor(&self, name: &str) -> Option<Arc<Sensor>> {
        self.sensors.get(name).map(|s| s.clone())
    }

    fn remove_sensor(&self, name: &str) -> Result<()> {
        self.sensors.remove(name);
        Ok(())
    }

    fn metric_value(&self, name: &MetricName) -> Option<f64> {
        self.sensors
            .iter()
            .find_map(|entry| entry.value().metric_value(name))
    }
}

// ============================================================================
// Naming conventions
// ============================================================================

/// Naming and scoping conventions over a [`MetricsRegistry`].
///
/// Store and node sensors are registered per scope so that everything a
/// store or node created can be removed with one call when it closes.
/// Task-level sensors are shared by every node of a task and stay in the
/// registry for the life of the task.
pub struct StreamsMetrics {
    registry: Arc<dyn MetricsRegistry>,
    store_level_sensors: Mutex<HashMap<String, Vec<String>>>,
    node_level_sensors: Mutex<HashMap<String, Vec<String>>>,
}

impl StreamsMetrics {
    /// Wrap a registry.
    pub fn new(registry: Arc<dyn MetricsRegistry>) -> Self {
        Self {
            registry,
            store_level_sensors: Mutex::new(HashMap::new()),
            node_level_sensors: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<dyn MetricsRegistry> {
        &self.registry
    }

    /// Current value of a metric.
    pub fn metric_value(&self, name: &MetricName) -> Option<f64> {
        self.registry.metric_value(name)
    }

    /// Tags of a store-level metric.
    pub fn store_level_tags(
        thread_id: &str,
        task_id: &str,
        store_type: &str,
        store_name: &str,
    ) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert(THREAD_ID_TAG.to_string(), thread_id.to_string());
        tags.insert(TASK_ID_TAG.to_string(), task_id.to_string());
        tags.insert(format!("{}-state-id", store_type), store_name.to_string());
        tags
    }

    /// Tags of a node-level metric.
    pub fn node_level_tags(thread_id: &str, task_id: &str, node: &str) -> BTreeMap<String, String> {
        let mut tags = Self::task_level_tags(thread_id, task_id);
        tags.insert(PROCESSOR_NODE_ID_TAG.to_string(), node.to_string());
        tags
    }

    /// Tags of a task-level metric.
    pub fn task_level_tags(thread_id: &str, task_id: &str) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert(THREAD_ID_TAG.to_string(), thread_id.to_string());
        tags.insert(TASK_ID_TAG.to_string(), task_id.to_string());
        tags
    }

    fn store_scope(thread_id: &str, task_id: &str, store_name: &str) -> String {
        format!("{}.task.{}.store.{}", thread_id, task_id, store_name)
    }

    fn node_scope(thread_id: &str, task_id: &str, node: &str) -> String {
        format!("{}.task.{}.node.{}", thread_id, task_id, node)
    }

    fn task_scope(thread_id: &str, task_id: &str) -> String {
        format!("{}.task.{}", thread_id, task_id)
    }

    fn scoped_sensor(
        &self,
        sensors: &Mutex<HashMap<String, Vec<String>>>,
        scope: String,
        sensor_name: &str,
        level: RecordingLevel,
        parents: &[Arc<Sensor>],
    ) -> Arc<Sensor> {
        let full_name = format!("{}.s.{}", scope, sensor_name);
        let sensor = self.registry.sensor(&full_name, level, parents);
        let mut sensors = sensors.lock();
        let names = sensors.entry(scope).or_default();
        if !names.contains(&full_name) {
            names.push(full_name);
        }
        sensor
    }

    fn remove_scope(&self, sensors: &Mutex<HashMap<String, Vec<String>>>, scope: &str) -> Result<()> {
        let names = sensors.lock().remove(scope).unwrap_or_default();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.registry.remove_sensor(&name) {
                warn!(target: "strata::metrics", sensor = %name, error = %e, "Failed to remove sensor");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Get or create a store-level sensor.
    pub fn store_level_sensor(
        &self,
        thread_id: &str,
        task_id: &str,
        store_name: &str,
        sensor_name: &str,
        level: RecordingLevel,
        parents: &[Arc<Sensor>],
    ) -> Arc<Sensor> {
        let scope = Self::store_scope(thread_id, task_id, store_name);
        self.scoped_sensor(&self.store_level_sensors, scope, sensor_name, level, parents)
    }

    /// Remove every sensor registered for a store.
    ///
    /// Attempts every removal and reports the first failure.
    pub fn remove_all_store_level_sensors(
        &self,
        thread_id: &str,
        task_id: &str,
        store_name: &str,
    ) -> Result<()> {
        let scope = Self::store_scope(thread_id, task_id, store_name);
        self.remove_scope(&self.store_level_sensors, &scope)
    }

    /// Get or create a node-level sensor.
    pub fn node_level_sensor(
        &self,
        thread_id: &str,
        task_id: &str,
        node: &str,
        sensor_name: &str,
        level: RecordingLevel,
        parents: &[Arc<Sensor>],
    ) -> Arc<Sensor> {
        let scope = Self::node_scope(thread_id, task_id, node);
        self.scoped_sensor(&self.node_level_sensors, scope, sensor_name, level, parents)
    }

    /// Remove every sensor registered for a processor node.
    pub fn remove_all_node_level_sensors(&self, thread_id: &str, task_id: &str, node: &str) -> Result<()> {
        let scope = Self::node_scope(thread_id, task_id, node);
        self.remove_scope(&self.node_level_sensors, &scope)
    }

    /// Get or create a task-level sensor.
    pub fn task_level_sensor(
        &self,
        thread_id: &str,
        task_id: &str,
        sensor_name: &str,
        level: RecordingLevel,
        parents: &[Arc<Sensor>],
    ) -> Arc<Sensor> {
        let full_name = format!("{}.s.{}", Self::task_scope(thread_id, task_id), sensor_name);
        self.registry.sensor(&full_name, level, parents)
    }

    /// Attach `<operation>-rate` and `<operation>-total`.
    pub fn add_invocation_rate_and_count(
        sensor: &Sensor,
        group: &str,
        tags: &BTreeMap<String, String>,
        operation: &str,
    ) {
        sensor.add_metric(
            MetricName::new(format!("{}{}", operation, RATE_SUFFIX), group, tags.clone()),
            Stat::Rate,
        );
        sensor.add_metric(
            MetricName::new(format!("{}{}", operation, TOTAL_SUFFIX), group, tags.clone()),
            Stat::Total,
        );
    }

    /// Attach `<operation>-latency-avg` and `<operation>-latency-max`.
    pub fn add_avg_and_max_latency(
        sensor: &Sensor,
        group: &str,
        tags: &BTreeMap<String, String>,
        operation: &str,
    ) {
        sensor.add_metric(
            MetricName::new(format!("{}{}", operation, LATENCY_AVG_SUFFIX), group, tags.clone()),
            Stat::Avg,
        );
        sensor.add_metric(
            MetricName::new(format!("{}{}", operation, LATENCY_MAX_SUFFIX), group, tags.clone()),
            Stat::Max,
        );
    }
}

impl fmt::Debug for StreamsMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamsMetrics")
            .field("recording_level", &self.registry.recording_level())
            .finish()
    }
}

/// Run `action`, timing it on `sensor` if the sensor records.
///
/// Exactly one observation is recorded per call whether `action` returns
/// `Ok` or `Err`; the result is handed back untouched.
pub fn maybe_measure_latency<T>(action: impl FnOnce() -> T, clock: &dyn Clock, sensor: &Sensor) -> T {
    if sensor.should_record() {
        let start_ns = clock.nanoseconds();
        let result = action();
        let elapsed_ns = clock.nanoseconds() - start_ns;
        sensor.record(elapsed_ns as f64, clock.milliseconds());
        result
    } else {
        action()
    }
}
