//! Raw store surface
//!
//! The typed, metered stores sit on top of byte-oriented stores that
//! implement these traits. Layering is by composition: a wrapper holds the
//! store below it behind one of these traits and never inspects its
//! concrete type. Optional capabilities (currently only caching) are
//! queried through [`StateStore::caching`].
//!
//! Thread safety: a store is owned by one task and driven from that
//! task's thread, so mutating methods take `&mut self` and stores only
//! need to be `Send`.

use crate::context::ProcessorContext;
use crate::error::Result;
use crate::types::{Bytes, KeyValue};

/// Lifecycle common to every store.
pub trait StateStore: Send {
    /// Store name, unique within a task.
    fn name(&self) -> &str;

    /// Bind the store to its task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    fn init(&mut self, context: &ProcessorContext) -> Result<()>;

    /// Persist buffered writes.
    fn flush(&mut self) -> Result<()>;

    /// Release the store's resources.
    fn close(&mut self) -> Result<()>;

    /// True between a successful `init` and `close`.
    fn is_open(&self) -> bool;

    /// True if the store survives a restart.
    fn persistent(&self) -> bool;

    /// Caching capability of this store, if it has one.
    ///
    /// Wrappers that do not cache themselves forward the query to the
    /// store they wrap.
    fn caching(&mut self) -> Option<&mut dyn CachedStateStore> {
        None
    }
}

/// A closable cursor over key/value pairs.
///
/// Iterators hold resources of the store they came from until closed.
/// Closing early is always allowed; after `close`, `next` returns `None`.
pub trait KeyValueIterator<K, V>: Iterator<Item = Result<KeyValue<K, V>>> {
    /// Release the cursor.
    fn close(&mut self);
}

/// Boxed iterator borrowed from a store.
pub type KeyValueIter<'a, K, V> = Box<dyn KeyValueIterator<K, V> + 'a>;

/// Iterator over one key's windows, keyed by window start.
pub type WindowStoreIter<'a, V> = Box<dyn KeyValueIterator<i64, V> + 'a>;

/// Byte-oriented key/value store.
///
/// Keys are ordered lexicographically; range bounds are inclusive.
pub trait KeyValueBytesStore: StateStore {
    /// Value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Store `value` under `key`; `None` deletes the key.
    fn put(&mut self, key: Bytes, value: Option<Bytes>) -> Result<()>;

    /// Store `value` only if `key` is absent; returns the existing value.
    fn put_if_absent(&mut self, key: Bytes, value: Bytes) -> Result<Option<Bytes>>;

    /// Store each entry as by `put`.
    fn put_all(&mut self, entries: Vec<KeyValue<Bytes, Option<Bytes>>>) -> Result<()>;

    /// Remove `key`; returns the removed value.
    fn delete(&mut self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Entries with `from <= key <= to`, in key order.
    fn range(&self, from: &[u8], to: &[u8]) -> Result<KeyValueIter<'_, Bytes, Bytes>>;

    /// All entries, in key order.
    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>>;

    /// Approximate number of entries.
    fn approximate_num_entries(&self) -> u64;
}

/// Byte-oriented window store.
///
/// Entries are addressed by encoded key and window start. Iterators over
/// several keys yield *store keys* (`key ++ be64(window_start)`); see
/// [`crate::window_key::WindowKeySchema`].
pub trait WindowBytesStore: StateStore {
    /// Store `value` for `key` in the window starting at `window_start_ms`;
    /// `None` deletes the entry.
    fn put(&mut self, key: &[u8], value: Option<Bytes>, window_start_ms: i64) -> Result<()>;

    /// Value of `key` in the window starting at `window_start_ms`.
    fn fetch(&self, key: &[u8], window_start_ms: i64) -> Result<Option<Bytes>>;

    /// Windows of one key with start in `[time_from, time_to]`, by
    /// increasing window start.
    fn fetch_range(&self, key: &[u8], time_from: i64, time_to: i64) -> Result<WindowStoreIter<'_, Bytes>>;

    /// Windows of keys in `[from, to]` with start in `[time_from, time_to]`.
    fn fetch_key_range(
        &self,
        from: &[u8],
        to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> Result<KeyValueIter<'_, Bytes, Bytes>>;

    /// Windows of all keys with start in `[time_from, time_to]`.
    fn fetch_all(&self, time_from: i64, time_to: i64) -> Result<KeyValueIter<'_, Bytes, Bytes>>;

    /// Every window of every key.
    fn all(&self) -> Result<KeyValueIter<'_, Bytes, Bytes>>;
}

/// A raw entry written through by a caching layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushEvent {
    /// Raw key (a store key for window stores)
    pub key: Bytes,
    /// Value written, `None` for a delete
    pub new_value: Option<Bytes>,
    /// Value it replaced; only filled when old values were requested
    pub old_value: Option<Bytes>,
    /// Timestamp of the record that produced the entry
    pub timestamp: i64,
}

/// Callback receiving raw flush events.
///
/// An error aborts the flush that produced the event.
pub type RawFlushListener = Box<dyn FnMut(FlushEvent) -> Result<()> + Send>;

/// Caching capability.
pub trait CachedStateStore {
    /// Register the listener invoked for every flushed entry.
    ///
    /// Returns true if the listener was registered.
    fn set_flush_listener(&mut self, listener: RawFlushListener, send_old_values: bool) -> bool;
}
