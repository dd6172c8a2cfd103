//! Strata Streams - metered, serde-aware state stores for stream processing
//!
//! Typed key/value, timestamped and window stores layered over raw byte
//! stores, timing every operation on per-store sensors.
//!
//! # Quick Start
//!
//! ```
//! use strata_streams::{ProcessorContext, Serdes, StateStore, Stores};
//!
//! let context = ProcessorContext::builder("my-app").build();
//! let mut store = Stores::key_value_store_builder::<String, i64>("counts")
//!     .with_key_serde(Serdes::string())
//!     .with_value_serde(Serdes::long())
//!     .build();
//! store.init(&context)?;
//!
//! store.put(&"clicks".to_string(), &1)?;
//! assert_eq!(store.get(&"clicks".to_string())?, Some(1));
//! # Ok::<(), strata_streams::StreamsError>(())
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: errors, codecs, context, metrics, raw store traits
//! - `strata-storage`: in-memory, window and caching raw stores
//! - `strata-state`: the metered stores and their builders
//! - `strata-processor`: source node and processor nodes

pub use strata_core::*;
pub use strata_processor::{
    processor_fn, ConsumerRecord, Processor, ProcessorNode, Record, RecordTimestampExtractor,
    SourceNode, TimestampExtractor, WallclockTimestampExtractor,
};
pub use strata_state::{
    FlushedChange, MeteredKeyValueStore, MeteredTimestampedKeyValueStore, MeteredWindowStore,
    RawAndDeserializedValue, Stores,
};
pub use strata_storage::{CachingKeyValueStore, InMemoryKeyValueStore, KeyValueWindowStore};
