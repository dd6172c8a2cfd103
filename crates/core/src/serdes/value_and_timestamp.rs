//! Value-with-timestamp envelope codec.
//!
//! Encoding: `be64(timestamp_ms) ++ encode(value)`. The layout is persisted
//! in raw stores and changelogs and must stay bit-exact.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use super::resolver::{DefaultSerdes, SerdeSlot, WrappingSerde};
use super::traits::{Serde, SerdeError};
use crate::error::{Result, StreamsError};
use crate::types::ValueAndTimestamp;

/// Width of the timestamp prefix.
pub const TIMESTAMP_SIZE: usize = 8;

/// Codec for [`ValueAndTimestamp`] wrapping a codec for the value.
pub struct ValueAndTimestampSerde<V> {
    value_serde: Arc<dyn Serde<V>>,
}

impl<V> ValueAndTimestampSerde<V> {
    /// Wrap `value_serde`.
    pub fn new(value_serde: Arc<dyn Serde<V>>) -> Self {
        Self { value_serde }
    }
}

impl<V: 'static> ValueAndTimestampSerde<V> {
    /// Slot for an envelope whose value codec may be unset.
    ///
    /// An unset value codec is taken from the default *value* codec at
    /// resolution time.
    pub fn wrapping(value_serde: Option<Arc<dyn Serde<V>>>) -> SerdeSlot<ValueAndTimestamp<V>> {
        SerdeSlot::Wrapping(Arc::new(UnresolvedValueAndTimestamp { value_serde }))
    }
}

impl<V> Serde<ValueAndTimestamp<V>> for ValueAndTimestampSerde<V> {
    fn serialize(&self, topic: &str, data: &ValueAndTimestamp<V>) -> std::result::Result<Vec<u8>, SerdeError> {
        let payload = self.value_serde.serialize(topic, data.value())?;
        let mut out = vec![0u8; TIMESTAMP_SIZE];
        BigEndian::write_i64(&mut out, data.timestamp());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn deserialize(&self, topic: &str, data: &[u8]) -> std::result::Result<ValueAndTimestamp<V>, SerdeError> {
        let timestamp = raw_timestamp(data)?;
        let value = self.value_serde.deserialize(topic, raw_value(data))?;
        Ok(ValueAndTimestamp::make(value, timestamp))
    }

    fn serde_id(&self) -> &str {
        "value-and-timestamp"
    }
}

struct UnresolvedValueAndTimestamp<V> {
    value_serde: Option<Arc<dyn Serde<V>>>,
}

impl<V: 'static> WrappingSerde<ValueAndTimestamp<V>> for UnresolvedValueAndTimestamp<V> {
    fn resolve(&self, defaults: &DefaultSerdes) -> Result<Arc<dyn Serde<ValueAndTimestamp<V>>>> {
        let value_serde = match &self.value_serde {
            Some(serde) => Arc::clone(serde),
            None => defaults.value::<V>()?.ok_or_else(|| {
                StreamsError::config(
                    "no value serde was specified for the timestamped value and no \
                     default value serde is configured",
                )
            })?,
        };
        Ok(Arc::new(ValueAndTimestampSerde::new(value_serde)))
    }
}

/// Timestamp prefix of an encoded envelope.
pub fn raw_timestamp(raw: &[u8]) -> std::result::Result<i64, SerdeError> {
    if raw.len() < TIMESTAMP_SIZE {
        return Err(SerdeError::Decode(format!(
            "timestamped value needs at least {} bytes, got {}",
            TIMESTAMP_SIZE,
            raw.len()
        )));
    }
    Ok(BigEndian::read_i64(&raw[..TIMESTAMP_SIZE]))
}

/// Encoded payload of an envelope, without the timestamp prefix.
///
/// Returns an empty slice for inputs shorter than the prefix.
pub fn raw_value(raw: &[u8]) -> &[u8] {
    raw.get(TIMESTAMP_SIZE..).unwrap_or(&[])
}

/// True if the encoded payloads are byte-identical and the new timestamp
/// is not older than the old one.
///
/// This is the skip rule for conditional writes: such a write would only
/// advance the timestamp of an unchanged value. An absent old value, a
/// changed payload, or an out-of-order (older) timestamp all return
/// `false`, so the write happens.
pub fn values_are_same_and_time_is_increasing(old: Option<&[u8]>, new: &[u8]) -> bool {
    let Some(old) = old else {
        return false;
    };
    let (Ok(old_ts), Ok(new_ts)) = (raw_timestamp(old), raw_timestamp(new)) else {
        return false;
    };
    raw_value(old) == raw_value(new) && new_ts >= old_ts
}
