//! Core types and traits for the Strata state-store layer
//!
//! This crate defines the foundations shared by the store and processor
//! crates:
//! - StreamsError: error type hierarchy
//! - Serde / SerdeSlot / StateSerdes: codecs and late-bound codec resolution
//! - Windowed / ValueAndTimestamp: typed keys and values of windowed and
//!   timestamped stores
//! - WindowKeySchema: binary layout of windowed store keys
//! - StateStore / KeyValueBytesStore / WindowBytesStore: raw store surface
//! - ProcessorContext: task identity, ambient codecs, metrics and clock
//! - StreamsMetrics / Sensor: metrics registry and naming conventions
//! - StreamsConfig: `streams.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod iter;
pub mod metrics;
pub mod serdes;
pub mod time;
pub mod traits;
pub mod types;
pub mod window_key;

pub use config::{SerdeKind, StreamsConfig};
pub use context::{ProcessorContext, ProcessorContextBuilder};
pub use error::{BoxError, Result, StreamsError};
pub use iter::SnapshotIterator;
pub use metrics::{
    maybe_measure_latency, InMemoryMetricsRegistry, MetricName, MetricsRegistry, RecordingLevel,
    Sensor, Stat, StreamsMetrics,
};
pub use serdes::{
    DefaultSerdes, Serde, SerdeError, SerdeSlot, Serdes, StateSerdes, ValueAndTimestampSerde,
};
pub use time::{Clock, MockClock, SystemClock};
pub use traits::{
    CachedStateStore, FlushEvent, KeyValueBytesStore, KeyValueIter, KeyValueIterator,
    RawFlushListener, StateStore, WindowBytesStore, WindowStoreIter,
};
pub use types::{Bytes, Headers, KeyValue, TaskId, TimeWindow, ValueAndTimestamp, Windowed};
pub use window_key::{TimeWindowedSerde, WindowKeySchema};
