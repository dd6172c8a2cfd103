//! Built-in codecs.

use std::marker::PhantomData;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::{Serde, SerdeError};

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerde;

impl Serde<String> for StringSerde {
    fn serialize(&self, _topic: &str, data: &String) -> Result<Vec<u8>, SerdeError> {
        Ok(data.as_bytes().to_vec())
    }

    fn deserialize(&self, _topic: &str, data: &[u8]) -> Result<String, SerdeError> {
        String::from_utf8(data.to_vec()).map_err(|e| SerdeError::Decode(e.to_string()))
    }

    fn serde_id(&self) -> &str {
        "string"
    }
}

/// Fixed-width 8-byte big-endian `i64` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongSerde;

impl Serde<i64> for LongSerde {
    fn serialize(&self, _topic: &str, data: &i64) -> Result<Vec<u8>, SerdeError> {
        let mut buf = vec![0u8; 8];
        BigEndian::write_i64(&mut buf, *data);
        Ok(buf)
    }

    fn deserialize(&self, _topic: &str, data: &[u8]) -> Result<i64, SerdeError> {
        if data.len() != 8 {
            return Err(SerdeError::Decode(format!(
                "size of data received by LongSerde is not 8 but {}",
                data.len()
            )));
        }
        Ok(BigEndian::read_i64(data))
    }

    fn serde_id(&self) -> &str {
        "long"
    }
}

/// Pass-through codec for raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerde;

impl Serde<Vec<u8>> for BytesSerde {
    fn serialize(&self, _topic: &str, data: &Vec<u8>) -> Result<Vec<u8>, SerdeError> {
        Ok(data.clone())
    }

    fn deserialize(&self, _topic: &str, data: &[u8]) -> Result<Vec<u8>, SerdeError> {
        Ok(data.to_vec())
    }

    fn serde_id(&self) -> &str {
        "bytes"
    }
}

/// JSON codec for any serde-serializable type.
pub struct JsonSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerde<T> {
    /// Create a JSON codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Serde<T> for JsonSerde<T> {
    fn serialize(&self, _topic: &str, data: &T) -> Result<Vec<u8>, SerdeError> {
        serde_json::to_vec(data).map_err(|e| SerdeError::Encode(e.to_string()))
    }

    fn deserialize(&self, _topic: &str, data: &[u8]) -> Result<T, SerdeError> {
        serde_json::from_slice(data).map_err(|e| SerdeError::Decode(e.to_string()))
    }

    fn serde_id(&self) -> &str {
        "json"
    }
}

/// Compact binary codec for any serde-serializable type.
pub struct BincodeSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerde<T> {
    /// Create a bincode codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Serde<T> for BincodeSerde<T> {
    fn serialize(&self, _topic: &str, data: &T) -> Result<Vec<u8>, SerdeError> {
        bincode::serialize(data).map_err(|e| SerdeError::Encode(e.to_string()))
    }

    fn deserialize(&self, _topic: &str, data: &[u8]) -> Result<T, SerdeError> {
        bincode::deserialize(data).map_err(|e| SerdeError::Decode(e.to_string()))
    }

    fn serde_id(&self) -> &str {
        "bincode"
    }
}

/// Factory for shared built-in codecs.
///
/// ```
/// use strata_core::serdes::Serdes;
///
/// let serde = Serdes::string();
/// let bytes = serde.serialize("topic", &"hello".to_string()).unwrap();
/// assert_eq!(bytes, b"hello");
/// ```
pub struct Serdes;

impl Serdes {
    /// Shared [`StringSerde`].
    pub fn string() -> Arc<dyn Serde<String>> {
        Arc::new(StringSerde)
    }

    /// Shared [`LongSerde`].
    pub fn long() -> Arc<dyn Serde<i64>> {
        Arc::new(LongSerde)
    }

    /// Shared [`BytesSerde`].
    pub fn bytes() -> Arc<dyn Serde<Vec<u8>>> {
        Arc::new(BytesSerde)
    }

    /// Shared [`JsonSerde`].
    pub fn json<T: Serialize + DeserializeOwned + 'static>() -> Arc<dyn Serde<T>> {
        Arc::new(JsonSerde::<T>::new())
    }

    /// Shared [`BincodeSerde`].
    pub fn bincode<T: Serialize + DeserializeOwned + 'static>() -> Arc<dyn Serde<T>> {
        Arc::new(BincodeSerde::<T>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Click {
        user: String,
        count: u32,
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let result = StringSerde.deserialize("t", &[0xFF, 0xFE]);
        assert!(matches!(result, Err(SerdeError::Decode(_))));
    }

    #[test]
    fn test_long_is_big_endian() {
        let bytes = LongSerde.serialize("t", &97).unwrap();
        assert_eq!(bytes, b"\0\0\0\0\0\0\0a");
    }

    #[test]
    fn test_long_rejects_wrong_width() {
        let result = LongSerde.deserialize("t", &[1, 2, 3]);
        assert!(matches!(result, Err(SerdeError::Decode(_))));
    }

    #[test]
    fn test_json_struct() {
        let serde = JsonSerde::<Click>::new();
        let click = Click {
            user: "alice".to_string(),
            count: 3,
        };
        let bytes = serde.serialize("t", &click).unwrap();
        assert_eq!(serde.deserialize("t", &bytes).unwrap(), click);
    }

    #[test]
    fn test_bincode_rejects_garbage() {
        let serde = BincodeSerde::<Click>::new();
        assert!(serde.deserialize("t", &[0xFF]).is_err());
    }

    #[test]
    fn test_serde_ids() {
        assert_eq!(Serdes::string().serde_id(), "string");
        assert_eq!(Serdes::long().serde_id(), "long");
        assert_eq!(Serdes::bytes().serde_id(), "bytes");
        assert_eq!(Serdes::json::<Click>().serde_id(), "json");
        assert_eq!(Serdes::bincode::<Click>().serde_id(), "bincode");
    }

    proptest! {
        #[test]
        fn prop_string_round_trip(s in ".*") {
            let bytes = StringSerde.serialize("t", &s).unwrap();
            prop_assert_eq!(StringSerde.deserialize("t", &bytes).unwrap(), s);
        }

        #[test]
        fn prop_long_round_trip(v in any::<i64>()) {
            let bytes = LongSerde.serialize("t", &v).unwrap();
            prop_assert_eq!(LongSerde.deserialize("t", &bytes).unwrap(), v);
        }

        #[test]
        fn prop_bincode_round_trip(user in "[a-z]{0,16}", count in any::<u32>()) {
            let serde = BincodeSerde::<Click>::new();
            let click = Click { user, count };
            let bytes = serde.serialize("t", &click).unwrap();
            prop_assert_eq!(serde.deserialize("t", &bytes).unwrap(), click);
        }
    }
}
