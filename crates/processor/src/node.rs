//! Processor node base
//!
//! A node owns a name and its node-level sensors. `init` creates the
//! sensors with get-or-create semantics: a sensor registered earlier under
//! the same name is reused as it is, parents included.

use std::sync::Arc;

use strata_core::{ProcessorContext, Result, StreamsMetrics};
use tracing::{debug, warn};

use crate::metrics::{NodeScope, NodeSensors};

struct NodeState {
    metrics: Arc<StreamsMetrics>,
    scope: NodeScope,
    sensors: NodeSensors,
}

/// Name and node-level sensors of a processor node.
pub struct ProcessorNode {
    name: String,
    state: Option<NodeState>,
}

impl ProcessorNode {
    /// Node named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope of this node's sensors under `context`.
    pub fn scope(&self, context: &ProcessorContext) -> NodeScope {
        NodeScope {
            thread_id: context.thread_id().to_string(),
            task_id: context.task_id().to_string(),
            node: self.name.clone(),
        }
    }

    /// Sensors created by `init`.
    pub fn sensors(&self) -> Option<&NodeSensors> {
        self.state.as_ref().map(|state| &state.sensors)
    }

    /// Get or create the node's sensors.
    pub fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        let scope = self.scope(context);
        let metrics = Arc::clone(context.metrics());
        let sensors = NodeSensors::register(&metrics, &scope);
        debug!(
            target: "strata::processor",
            node = %self.name,
            task_id = %scope.task_id,
            "Initialized processor node"
        );
        self.state = Some(NodeState {
            metrics,
            scope,
            sensors,
        });
        Ok(())
    }

    /// Remove the node's sensors.
    pub fn close(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let removed = state.metrics.remove_all_node_level_sensors(
            &state.scope.thread_id,
            &state.scope.task_id,
            &state.scope.node,
        );
        if let Err(e) = &removed {
            warn!(target: "strata::processor", node = %self.name, error = %e, "Failed to remove node sensors");
        }
        removed
    }
}
