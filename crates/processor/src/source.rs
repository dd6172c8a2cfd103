//! Source node: deserializes consumed records and forwards them
//!
//! # Initialization order
//!
//! The `process` sensor, with its task-level rollup parent, is created
//! before the base node's `init`. The base init gets or creates a `process`
//! sensor of the same name; created in the other order the sensor would
//! have no parent and the task-level rollup would never be recorded.

use std::sync::Arc;

use strata_core::metrics::maybe_measure_latency;
use strata_core::serdes::{prepare_key_serde, prepare_value_serde};
use strata_core::{Headers, ProcessorContext, Result, Sensor, Serde, SerdeSlot, StreamsError};
use tracing::{debug, trace};

use crate::metrics::process_at_source_sensor;
use crate::node::ProcessorNode;
use crate::processor::Processor;
use crate::record::{ConsumerRecord, Record};
use crate::timestamp::TimestampExtractor;

struct SourceState<K, V> {
    context: ProcessorContext,
    key_serde: Arc<dyn Serde<K>>,
    value_serde: Arc<dyn Serde<V>>,
    process_sensor: Arc<Sensor>,
}

/// Entry node of a topology.
pub struct SourceNode<K, V> {
    node: ProcessorNode,
    key_serde: SerdeSlot<K>,
    value_serde: SerdeSlot<V>,
    timestamp_extractor: Option<Arc<dyn TimestampExtractor>>,
    children: Vec<Box<dyn Processor<K, V>>>,
    state: Option<SourceState<K, V>>,
}

impl<K, V> SourceNode<K, V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    /// Source node named `name`; unset codecs are taken from the context
    /// defaults at `init`.
    pub fn new(name: impl Into<String>, key_serde: SerdeSlot<K>, value_serde: SerdeSlot<V>) -> Self {
        Self {
            node: ProcessorNode::new(name),
            key_serde,
            value_serde,
            timestamp_extractor: None,
            children: Vec::new(),
            state: None,
        }
    }

    /// Attach a timestamp extraction policy.
    pub fn with_timestamp_extractor(mut self, extractor: Arc<dyn TimestampExtractor>) -> Self {
        self.timestamp_extractor = Some(extractor);
        self
    }

    /// Add a downstream processor; records are forwarded in insertion order.
    pub fn add_child(&mut self, child: Box<dyn Processor<K, V>>) {
        self.children.push(child);
    }

    /// Node name.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Configured timestamp extraction policy, if any.
    pub fn timestamp_extractor(&self) -> Option<&Arc<dyn TimestampExtractor>> {
        self.timestamp_extractor.as_ref()
    }

    /// The base node.
    pub fn node(&self) -> &ProcessorNode {
        &self.node
    }

    /// Create sensors, resolve codecs and initialize the children.
    pub fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        let scope = self.node.scope(context);
        let process_sensor = process_at_source_sensor(context.metrics(), &scope);
        self.node.init(context)?;

        let defaults = context.default_serdes();
        let key_serde = prepare_key_serde(&self.key_serde, defaults)?;
        let value_serde = prepare_value_serde(&self.value_serde, defaults)?;
        self.key_serde = SerdeSlot::Explicit(Arc::clone(&key_serde));
        self.value_serde = SerdeSlot::Explicit(Arc::clone(&value_serde));
        debug!(
            target: "strata::processor",
            node = %self.node.name(),
            key_serde = key_serde.serde_id(),
            value_serde = value_serde.serde_id(),
            "Resolved source node serdes"
        );

        let children = &mut self.children;
        let mut init_children = || children.iter_mut().try_for_each(|child| child.init(context));
        match self.node.sensors() {
            Some(sensors) => maybe_measure_latency(init_children, context.clock().as_ref(), &sensors.create)?,
            None => init_children()?,
        }

        self.state = Some(SourceState {
            context: context.clone(),
            key_serde,
            value_serde,
            process_sensor,
        });
        Ok(())
    }

    fn initialized(&self) -> Result<&SourceState<K, V>> {
        self.state.as_ref().ok_or_else(|| {
            StreamsError::InvalidOperation(format!("source node {} is not initialized", self.node.name()))
        })
    }

    /// Decode a raw key read from `topic`.
    pub fn deserialize_key(&self, topic: &str, headers: &Headers, data: &[u8]) -> Result<K> {
        self.initialized()?
            .key_serde
            .deserialize_with_headers(topic, headers, data)
            .map_err(|e| e.on_topic(topic))
    }

    /// Decode a raw value read from `topic`.
    pub fn deserialize_value(&self, topic: &str, headers: &Headers, data: &[u8]) -> Result<V> {
        self.initialized()?
            .value_serde
            .deserialize_with_headers(topic, headers, data)
            .map_err(|e| e.on_topic(topic))
    }

    /// Forward `record` to every child and record one `process` observation.
    ///
    /// The observation is recorded even if a child fails; the first child
    /// error is returned and later children are skipped.
    pub fn process(&mut self, record: Record<K, V>) -> Result<()> {
        let state = self.state.as_ref().ok_or_else(|| {
            StreamsError::InvalidOperation(format!("source node {} is not initialized", self.node.name()))
        })?;
        let forwarded = match self.children.split_last_mut() {
            Some((last, rest)) => rest
                .iter_mut()
                .try_for_each(|child| child.process(record.clone()))
                .and_then(|()| last.process(record)),
            None => Ok(()),
        };
        state
            .process_sensor
            .record(1.0, state.context.current_system_time_ms());
        forwarded
    }

    /// Deserialize a consumed record and process it.
    ///
    /// Null raw keys and values stay `None` without reaching the codecs.
    /// The context's record timestamp is set to the consumed record's.
    pub fn ingest(&mut self, record: &ConsumerRecord) -> Result<()> {
        let key = record
            .key
            .as_deref()
            .map(|raw| self.deserialize_key(&record.topic, &record.headers, raw))
            .transpose()?;
        let value = record
            .value
            .as_deref()
            .map(|raw| self.deserialize_value(&record.topic, &record.headers, raw))
            .transpose()?;
        self.initialized()?.context.set_record_timestamp(record.timestamp);
        trace!(
            target: "strata::processor",
            node = %self.node.name(),
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Ingesting record"
        );
        self.process(Record {
            key,
            value,
            timestamp: record.timestamp,
            headers: record.headers.clone(),
        })
    }

    /// Close the children and remove the node's sensors.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for child in &mut self.children {
            if let Err(e) = child.close() {
                first_error.get_or_insert(e);
            }
        }
        self.state = None;
        let removed = self.node.close();
        match first_error {
            Some(e) => Err(e),
            None => removed,
        }
    }
}
