//! Metered, serde-aware state stores
//!
//! Typed facades over the raw byte stores of `strata-storage`:
//! - MeteredKeyValueStore: key/value store timing every operation
//! - MeteredTimestampedKeyValueStore: key/value store of timestamped values
//! - MeteredWindowStore: store of per-window values
//! - MeteringWrapper: shared sensor lifecycle of the three
//! - Stores: builders over the in-memory raw stores
//!
//! Codecs left unset at construction are taken from the processor context
//! at `init`. Store-level sensors record at `DEBUG`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod flush_listener;
pub mod iterator;
pub mod key_value;
pub mod metered;
pub mod metrics;
pub mod timestamped;
pub mod window;

pub use builder::{
    KeyValueStoreBuilder, Stores, TimestampedKeyValueStoreBuilder, WindowStoreBuilder,
    IN_MEMORY_STATE_SCOPE, IN_MEMORY_WINDOW_STATE_SCOPE,
};
pub use flush_listener::FlushedChange;
pub use iterator::MeteredIterator;
pub use key_value::MeteredKeyValueStore;
pub use metered::MeteringWrapper;
pub use metrics::StoreScope;
pub use timestamped::{MeteredTimestampedKeyValueStore, RawAndDeserializedValue};
pub use window::MeteredWindowStore;
