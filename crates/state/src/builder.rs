//! Store builders
//!
//! Fluent construction of metered stores over the in-memory raw stores,
//! optionally with a write-back cache between the two.
//!
//! ```
//! use strata_core::Serdes;
//! use strata_state::Stores;
//!
//! let store = Stores::key_value_store_builder::<String, i64>("counts")
//!     .with_key_serde(Serdes::string())
//!     .with_value_serde(Serdes::long())
//!     .with_caching_enabled()
//!     .build();
//! # let _ = store;
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use strata_core::traits::{KeyValueBytesStore, WindowBytesStore};
use strata_core::{Serde, SerdeSlot, ValueAndTimestamp, ValueAndTimestampSerde};
use strata_storage::{
    CachingKeyValueStore, InMemoryKeyValueStore, KeyValueWindowStore, DEFAULT_MAX_DIRTY_ENTRIES,
};

use crate::key_value::MeteredKeyValueStore;
use crate::timestamped::MeteredTimestampedKeyValueStore;
use crate::window::MeteredWindowStore;

/// Metrics scope of in-memory key/value stores.
pub const IN_MEMORY_STATE_SCOPE: &str = "in-memory-state";
/// Metrics scope of in-memory window stores.
pub const IN_MEMORY_WINDOW_STATE_SCOPE: &str = "in-memory-window-state";

/// Entry point for store builders.
pub struct Stores;

impl Stores {
    /// Builder for a metered in-memory key/value store.
    pub fn key_value_store_builder<K, V>(name: impl Into<String>) -> KeyValueStoreBuilder<K, V> {
        KeyValueStoreBuilder {
            common: BuilderCommon::new(name),
        }
    }

    /// Builder for a metered in-memory store of timestamped values.
    pub fn timestamped_key_value_store_builder<K, V>(
        name: impl Into<String>,
    ) -> TimestampedKeyValueStoreBuilder<K, V> {
        TimestampedKeyValueStoreBuilder {
            common: BuilderCommon::new(name),
        }
    }

    /// Builder for a metered in-memory window store.
    pub fn window_store_builder<K, V>(
        name: impl Into<String>,
        window_size_ms: i64,
    ) -> WindowStoreBuilder<K, V> {
        WindowStoreBuilder {
            common: BuilderCommon::new(name),
            window_size_ms,
        }
    }
}

struct BuilderCommon<K, V> {
    name: String,
    key_serde: SerdeSlot<K>,
    value_serde: SerdeSlot<V>,
    cache_size: Option<usize>,
}

impl<K, V> BuilderCommon<K, V> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_serde: SerdeSlot::Unset,
            value_serde: SerdeSlot::Unset,
            cache_size: None,
        }
    }

    fn raw_key_value_store(&self) -> Box<dyn KeyValueBytesStore> {
        let store = InMemoryKeyValueStore::new(self.name.clone());
        match self.cache_size {
            Some(size) => Box::new(CachingKeyValueStore::with_max_dirty_entries(store, size)),
            None => Box::new(store),
        }
    }

    fn raw_window_store(&self) -> Box<dyn WindowBytesStore> {
        let store = InMemoryKeyValueStore::new(self.name.clone());
        match self.cache_size {
            Some(size) => Box::new(KeyValueWindowStore::new(
                CachingKeyValueStore::with_max_dirty_entries(store, size),
            )),
            None => Box::new(KeyValueWindowStore::new(store)),
        }
    }
}

macro_rules! builder_options {
    ($builder:ident) => {
        impl<K, V> $builder<K, V> {
            /// Set the key codec; unset takes the default key codec.
            pub fn with_key_serde(mut self, serde: Arc<dyn Serde<K>>) -> Self {
                self.common.key_serde = SerdeSlot::Explicit(serde);
                self
            }

            /// Set the value codec; unset takes the default value codec.
            pub fn with_value_serde(mut self, serde: Arc<dyn Serde<V>>) -> Self {
                self.common.value_serde = SerdeSlot::Explicit(serde);
                self
            }

            /// Put a write-back cache in front of the raw store.
            pub fn with_caching_enabled(mut self) -> Self {
                self.common.cache_size = Some(DEFAULT_MAX_DIRTY_ENTRIES);
                self
            }

            /// Put a write-back cache of `max_dirty_entries` in front of the raw store.
            pub fn with_cache_size(mut self, max_dirty_entries: usize) -> Self {
                self.common.cache_size = Some(max_dirty_entries);
                self
            }

            /// Write straight to the raw store.
            pub fn with_caching_disabled(mut self) -> Self {
                self.common.cache_size = None;
                self
            }
        }
    };
}

/// Builder for [`MeteredKeyValueStore`].
pub struct KeyValueStoreBuilder<K, V> {
    common: BuilderCommon<K, V>,
}

builder_options!(KeyValueStoreBuilder);

impl<K: Debug + 'static, V: Debug + 'static> KeyValueStoreBuilder<K, V> {
    /// Build the store; codecs are resolved at `init`.
    pub fn build(self) -> MeteredKeyValueStore<K, V> {
        MeteredKeyValueStore::new(
            self.common.raw_key_value_store(),
            IN_MEMORY_STATE_SCOPE,
            self.common.key_serde,
            self.common.value_serde,
        )
    }
}

/// Builder for [`MeteredTimestampedKeyValueStore`].
///
/// The value codec given here encodes the plain value; it is wrapped in the
/// timestamp envelope.
pub struct TimestampedKeyValueStoreBuilder<K, V> {
    common: BuilderCommon<K, V>,
}

builder_options!(TimestampedKeyValueStoreBuilder);

impl<K: Debug + 'static, V: Debug + 'static> TimestampedKeyValueStoreBuilder<K, V> {
    /// Build the store; codecs are resolved at `init`.
    pub fn build(self) -> MeteredTimestampedKeyValueStore<K, V> {
        let value_serde: SerdeSlot<ValueAndTimestamp<V>> = match &self.common.value_serde {
            SerdeSlot::Explicit(serde) => ValueAndTimestampSerde::wrapping(Some(Arc::clone(serde))),
            _ => ValueAndTimestampSerde::wrapping(None),
        };
        MeteredTimestampedKeyValueStore::new(
            self.common.raw_key_value_store(),
            IN_MEMORY_STATE_SCOPE,
            self.common.key_serde,
            value_serde,
        )
    }
}

/// Builder for [`MeteredWindowStore`].
pub struct WindowStoreBuilder<K, V> {
    common: BuilderCommon<K, V>,
    window_size_ms: i64,
}

builder_options!(WindowStoreBuilder);

impl<K: Debug + 'static, V: Debug + 'static> WindowStoreBuilder<K, V> {
    /// Build the store; codecs are resolved at `init`.
    pub fn build(self) -> MeteredWindowStore<K, V> {
        MeteredWindowStore::new(
            self.common.raw_window_store(),
            self.window_size_ms,
            IN_MEMORY_WINDOW_STATE_SCOPE,
            self.common.key_serde,
            self.common.value_serde,
        )
    }
}
