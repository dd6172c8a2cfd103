//! Binary layout of windowed keys in a flat key space
//!
//! A windowed raw store key is `encode(key) ++ be64(window_start_ms)`. The
//! window size is a store-level constant and is not persisted; it is only
//! needed to rebuild the window's end when a key is decoded.
//!
//! For one logical key, store keys order by window start, which is what
//! makes time-range fetches a contiguous range scan.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, StreamsError};
use crate::serdes::{DefaultSerdes, Serde, SerdeError, SerdeSlot, WrappingSerde};
use crate::types::{Bytes, TimeWindow, Windowed};

/// Width of the window-start suffix.
pub const TIMESTAMP_SIZE: usize = 8;

/// Encode/decode helpers for windowed store keys.
pub struct WindowKeySchema;

impl WindowKeySchema {
    /// Compose a store key from encoded key bytes and a window start.
    pub fn to_store_key_binary(key: &[u8], window_start_ms: i64) -> Bytes {
        let mut buf = Vec::with_capacity(key.len() + TIMESTAMP_SIZE);
        buf.extend_from_slice(key);
        let mut ts = [0u8; TIMESTAMP_SIZE];
        BigEndian::write_i64(&mut ts, window_start_ms);
        buf.extend_from_slice(&ts);
        buf
    }

    /// Encoded logical key part of a store key.
    pub fn extract_store_key_bytes(binary: &[u8]) -> Result<&[u8]> {
        Self::check_len(binary)?;
        Ok(&binary[..binary.len() - TIMESTAMP_SIZE])
    }

    /// Window start part of a store key.
    pub fn extract_store_timestamp(binary: &[u8]) -> Result<i64> {
        Self::check_len(binary)?;
        Ok(BigEndian::read_i64(&binary[binary.len() - TIMESTAMP_SIZE..]))
    }

    /// Rebuild a typed windowed key from a store key.
    ///
    /// `topic` is handed to the key codec, which may be topic-dependent.
    pub fn from_store_key<K>(
        binary: &[u8],
        window_size_ms: i64,
        key_serde: &dyn Serde<K>,
        topic: &str,
    ) -> Result<Windowed<K>> {
        let key_bytes = Self::extract_store_key_bytes(binary)?;
        let key = key_serde
            .deserialize(topic, key_bytes)
            .map_err(|e| e.on_topic(topic))?;
        let start = Self::extract_store_timestamp(binary)?;
        Ok(Windowed::new(key, TimeWindow::of_size(start, window_size_ms)))
    }

    /// Rebuild a windowed key whose logical key stays encoded.
    pub fn from_store_bytes_key(binary: &[u8], window_size_ms: i64) -> Result<Windowed<Bytes>> {
        let key_bytes = Self::extract_store_key_bytes(binary)?.to_vec();
        let start = Self::extract_store_timestamp(binary)?;
        Ok(Windowed::new(key_bytes, TimeWindow::of_size(start, window_size_ms)))
    }

    fn check_len(binary: &[u8]) -> Result<()> {
        if binary.len() < TIMESTAMP_SIZE {
            return Err(StreamsError::Storage(format!(
                "windowed store key needs at least {} bytes, got {}",
                TIMESTAMP_SIZE,
                binary.len()
            )));
        }
        Ok(())
    }
}

/// Codec for time-windowed keys using the store key layout.
pub struct TimeWindowedSerde<K> {
    key_serde: Arc<dyn Serde<K>>,
    window_size_ms: i64,
}

impl<K> TimeWindowedSerde<K> {
    /// Wrap `key_serde` for windows of `window_size_ms`.
    pub fn new(key_serde: Arc<dyn Serde<K>>, window_size_ms: i64) -> Self {
        Self {
            key_serde,
            window_size_ms,
        }
    }
}

impl<K: 'static> TimeWindowedSerde<K> {
    /// Slot for a windowed key codec whose inner key codec may be unset.
    ///
    /// An unset inner codec is taken from the default *key* codec.
    pub fn wrapping(
        key_serde: Option<Arc<dyn Serde<K>>>,
        window_size_ms: i64,
    ) -> SerdeSlot<Windowed<K>> {
        SerdeSlot::Wrapping(Arc::new(UnresolvedTimeWindowed {
            key_serde,
            window_size_ms,
        }))
    }
}

impl<K> Serde<Windowed<K>> for TimeWindowedSerde<K> {
    fn serialize(&self, topic: &str, data: &Windowed<K>) -> std::result::Result<Vec<u8>, SerdeError> {
        let key = self.key_serde.serialize(topic, data.key())?;
        Ok(WindowKeySchema::to_store_key_binary(&key, data.window().start()))
    }

    fn deserialize(&self, topic: &str, data: &[u8]) -> std::result::Result<Windowed<K>, SerdeError> {
        WindowKeySchema::from_store_key(data, self.window_size_ms, self.key_serde.as_ref(), topic)
            .map_err(|e| SerdeError::Decode(e.to_string()))
    }

    fn serde_id(&self) -> &str {
        "time-windowed"
    }
}

struct UnresolvedTimeWindowed<K> {
    key_serde: Option<Arc<dyn Serde<K>>>,
    window_size_ms: i64,
}

impl<K: 'static> WrappingSerde<Windowed<K>> for UnresolvedTimeWindowed<K> {
    fn resolve(&self, defaults: &DefaultSerdes) -> Result<Arc<dyn Serde<Windowed<K>>>> {
        let key_serde = match &self.key_serde {
            Some(serde) => Arc::clone(serde),
            None => defaults.key::<K>()?.ok_or_else(|| {
                StreamsError::config(
                    "no key serde was specified for the windowed key and no default key serde is configured",
                )
            })?,
        };
        Ok(Arc::new(TimeWindowedSerde::new(key_serde, self.window_size_ms)))
    }
}
