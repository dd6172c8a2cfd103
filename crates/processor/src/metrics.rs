//! Processor node sensors
//!
//! Node-level sensors live in the `stream-processor-node-metrics` group and
//! are tagged with `thread-id`, `task-id` and `processor-node-id`. The
//! source node's `process` sensor rolls up into a task-level `process`
//! sensor.

use std::sync::Arc;

use strata_core::metrics::{
    RecordingLevel, Sensor, StreamsMetrics, PROCESSOR_NODE_LEVEL_GROUP, TASK_LEVEL_GROUP,
};

/// Records admitted by a node.
pub const PROCESS: &str = "process";
/// Timing of a processor's `init`.
pub const CREATE: &str = "create";
/// Timing of a processor's `close`.
pub const DESTROY: &str = "destroy";

/// Identity of a node in sensor names and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScope {
    /// Owning worker thread
    pub thread_id: String,
    /// Owning task, as displayed
    pub task_id: String,
    /// Node name
    pub node: String,
}

fn node_sensor(metrics: &StreamsMetrics, scope: &NodeScope, operation: &str, parents: &[Arc<Sensor>]) -> Arc<Sensor> {
    let sensor = metrics.node_level_sensor(
        &scope.thread_id,
        &scope.task_id,
        &scope.node,
        operation,
        RecordingLevel::Debug,
        parents,
    );
    let tags = StreamsMetrics::node_level_tags(&scope.thread_id, &scope.task_id, &scope.node);
    StreamsMetrics::add_invocation_rate_and_count(&sensor, PROCESSOR_NODE_LEVEL_GROUP, &tags, operation);
    sensor
}

/// The source node's `process` sensor, parented by the task-level
/// `process` sensor.
///
/// Sensors are get-or-create: if the node-level sensor already exists it
/// is returned as it is, without the rollup parent.
pub fn process_at_source_sensor(metrics: &StreamsMetrics, scope: &NodeScope) -> Arc<Sensor> {
    let task_sensor = metrics.task_level_sensor(
        &scope.thread_id,
        &scope.task_id,
        PROCESS,
        RecordingLevel::Debug,
        &[],
    );
    let task_tags = StreamsMetrics::task_level_tags(&scope.thread_id, &scope.task_id);
    StreamsMetrics::add_invocation_rate_and_count(&task_sensor, TASK_LEVEL_GROUP, &task_tags, PROCESS);
    node_sensor(metrics, scope, PROCESS, &[task_sensor])
}

/// Sensors every node owns.
#[derive(Debug, Clone)]
pub struct NodeSensors {
    /// Records processed by the node
    pub process: Arc<Sensor>,
    /// Processor `init` timing
    pub create: Arc<Sensor>,
    /// Processor `close` timing
    pub destroy: Arc<Sensor>,
}

impl NodeSensors {
    /// Get or create the node's sensors.
    pub fn register(metrics: &StreamsMetrics, scope: &NodeScope) -> Self {
        let tags = StreamsMetrics::node_level_tags(&scope.thread_id, &scope.task_id, &scope.node);
        let create = node_sensor(metrics, scope, CREATE, &[]);
        StreamsMetrics::add_avg_and_max_latency(&create, PROCESSOR_NODE_LEVEL_GROUP, &tags, CREATE);
        let destroy = node_sensor(metrics, scope, DESTROY, &[]);
        StreamsMetrics::add_avg_and_max_latency(&destroy, PROCESSOR_NODE_LEVEL_GROUP, &tags, DESTROY);
        Self {
            process: node_sensor(metrics, scope, PROCESS, &[]),
            create,
            destroy,
        }
    }
}
