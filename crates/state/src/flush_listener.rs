//! Bridge from raw cache flush events to typed listeners
//!
//! The caching layer reports flushed entries as raw bytes. The adapters
//! here decode them with the store's resolved codecs before calling the
//! typed listener. The old value is decoded only when old values were
//! requested.
//!
//! A decode failure is not passed to the typed listener: it is logged and
//! returned to the caching layer as a configuration error, which aborts
//! the flush that produced the event.

use std::sync::Arc;

use strata_core::traits::{FlushEvent, RawFlushListener};
use strata_core::window_key::WindowKeySchema;
use strata_core::{Result, StateSerdes, StreamsError, Windowed};
use tracing::error;

/// A flushed entry, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedChange<K, V> {
    /// Key of the entry
    pub key: K,
    /// Value written, `None` for a delete
    pub new_value: Option<V>,
    /// Value replaced, if old values were requested and one existed
    pub old_value: Option<V>,
    /// Timestamp of the record that produced the entry
    pub timestamp: i64,
}

fn decode_values<K, V>(
    serdes: &StateSerdes<K, V>,
    event: &FlushEvent,
    send_old_values: bool,
) -> Result<(Option<V>, Option<V>)> {
    let new_value = event
        .new_value
        .as_deref()
        .map(|raw| serdes.value_from(raw))
        .transpose()?;
    let old_value = if send_old_values {
        event
            .old_value
            .as_deref()
            .map(|raw| serdes.value_from(raw))
            .transpose()?
    } else {
        None
    };
    Ok((new_value, old_value))
}

fn surface(store: &str, e: StreamsError) -> StreamsError {
    error!(target: "strata::state", store = %store, error = %e, "Failed to decode flushed entry");
    StreamsError::config(format!(
        "store {} cannot decode a flushed entry with its configured serdes: {}",
        store, e
    ))
}

/// Adapter for key/value stores.
pub fn key_value_adapter<K, V, F>(
    store: String,
    serdes: Arc<StateSerdes<K, V>>,
    send_old_values: bool,
    mut listener: F,
) -> RawFlushListener
where
    K: 'static,
    V: 'static,
    F: FnMut(FlushedChange<K, V>) + Send + 'static,
{
    Box::new(move |event: FlushEvent| {
        let decoded = serdes
            .key_from(&event.key)
            .and_then(|key| Ok((key, decode_values(&serdes, &event, send_old_values)?)));
        match decoded {
            Ok((key, (new_value, old_value))) => {
                listener(FlushedChange {
                    key,
                    new_value,
                    old_value,
                    timestamp: event.timestamp,
                });
                Ok(())
            }
            Err(e) => Err(surface(&store, e)),
        }
    })
}

/// Adapter for window stores; the raw key is a store key.
pub fn window_adapter<K, V, F>(
    store: String,
    serdes: Arc<StateSerdes<K, V>>,
    window_size_ms: i64,
    send_old_values: bool,
    mut listener: F,
) -> RawFlushListener
where
    K: 'static,
    V: 'static,
    F: FnMut(FlushedChange<Windowed<K>, V>) + Send + 'static,
{
    Box::new(move |event: FlushEvent| {
        let decoded = WindowKeySchema::from_store_key(
            &event.key,
            window_size_ms,
            serdes.key_serde().as_ref(),
            serdes.topic(),
        )
        .and_then(|key| Ok((key, decode_values(&serdes, &event, send_old_values)?)));
        match decoded {
            Ok((key, (new_value, old_value))) => {
                listener(FlushedChange {
                    key,
                    new_value,
                    old_value,
                    timestamp: event.timestamp,
                });
                Ok(())
            }
            Err(e) => Err(surface(&store, e)),
        }
    })
}
