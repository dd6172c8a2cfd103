//! Raw byte stores for the Strata state-store layer
//!
//! This crate implements the byte-oriented stores the metered stores wrap:
//! - InMemoryKeyValueStore: BTreeMap-backed key/value store
//! - KeyValueWindowStore: window store laid out over any key/value store
//! - CachingKeyValueStore: write-back cache emitting flush events
//!
//! The `testing` module provides call-recording and failure-injecting
//! doubles for the layers above.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caching;
pub mod memory;
pub mod testing;
pub mod window;

pub use caching::{CachingKeyValueStore, DEFAULT_MAX_DIRTY_ENTRIES};
pub use memory::InMemoryKeyValueStore;
pub use window::KeyValueWindowStore;
