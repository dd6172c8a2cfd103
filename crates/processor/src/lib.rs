//! Processor nodes for the Strata state-store layer
//!
//! This crate provides the ingestion side of a task:
//! - SourceNode: deserializes consumed records and forwards them
//! - ProcessorNode: node name and node-level sensors
//! - Processor: downstream stage receiving typed records
//! - TimestampExtractor: timestamp policies carried by source nodes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metrics;
pub mod node;
pub mod processor;
pub mod record;
pub mod source;
pub mod timestamp;

pub use metrics::{NodeScope, NodeSensors};
pub use node::ProcessorNode;
pub use processor::{processor_fn, FnProcessor, Processor};
pub use record::{ConsumerRecord, Record};
pub use source::SourceNode;
pub use timestamp::{RecordTimestampExtractor, TimestampExtractor, WallclockTimestampExtractor};
