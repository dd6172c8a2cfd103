//! Late-bound codec resolution.
//!
//! Stores and source nodes are built with optional codecs and bind them at
//! init time against the ambient defaults of the processing context:
//!
//! - an explicit codec always wins
//! - an unset codec takes the default for its role (key or value)
//! - a wrapping codec (a composite whose inner codec may be unset) is
//!   handed *both* defaults and builds itself from them
//!
//! Resolution fails with a configuration error when no codec can be
//! determined, or when the default codec encodes a different type than
//! the slot requires.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::builtin::Serdes;
use super::traits::Serde;
use crate::config::{SerdeKind, StreamsConfig};
use crate::error::{Result, StreamsError};

/// A codec with its value type erased.
///
/// Ambient defaults are configured once per application, independent of
/// the key and value types of the individual stores that use them.
#[derive(Clone)]
pub struct ErasedSerde {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ErasedSerde {
    /// Erase the type of `serde`.
    pub fn new<T: 'static>(serde: Arc<dyn Serde<T>>) -> Self {
        Self {
            type_name: type_name::<T>(),
            inner: Arc::new(serde),
        }
    }

    /// Recover the typed codec, or `None` if it encodes another type.
    pub fn downcast<T: 'static>(&self) -> Option<Arc<dyn Serde<T>>> {
        self.inner.downcast_ref::<Arc<dyn Serde<T>>>().cloned()
    }

    /// Name of the type this codec encodes.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ErasedSerde {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedSerde")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Which default a codec slot falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdeRole {
    /// Falls back to the default key codec
    Key,
    /// Falls back to the default value codec
    Value,
}

impl fmt::Display for SerdeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerdeRole::Key => write!(f, "key"),
            SerdeRole::Value => write!(f, "value"),
        }
    }
}

/// Ambient default key/value codecs of a processing context.
#[derive(Debug, Clone, Default)]
pub struct DefaultSerdes {
    key: Option<ErasedSerde>,
    value: Option<ErasedSerde>,
}

impl DefaultSerdes {
    /// No defaults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Typed defaults for both roles.
    pub fn new<K: 'static, V: 'static>(key: Arc<dyn Serde<K>>, value: Arc<dyn Serde<V>>) -> Self {
        Self {
            key: Some(ErasedSerde::new(key)),
            value: Some(ErasedSerde::new(value)),
        }
    }

    /// Set the default key codec.
    pub fn with_key<K: 'static>(mut self, key: Arc<dyn Serde<K>>) -> Self {
        self.key = Some(ErasedSerde::new(key));
        self
    }

    /// Set the default value codec.
    pub fn with_value<V: 'static>(mut self, value: Arc<dyn Serde<V>>) -> Self {
        self.value = Some(ErasedSerde::new(value));
        self
    }

    /// Defaults named in the configuration.
    pub fn from_config(config: &StreamsConfig) -> Self {
        Self {
            key: config.default_key_serde.map(erased_builtin),
            value: config.default_value_serde.map(erased_builtin),
        }
    }

    /// Default codec for `role`, downcast to `T`.
    ///
    /// Returns `Ok(None)` if no default is configured for the role.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the default encodes another type.
    pub fn get<T: 'static>(&self, role: SerdeRole) -> Result<Option<Arc<dyn Serde<T>>>> {
        let erased = match role {
            SerdeRole::Key => self.key.as_ref(),
            SerdeRole::Value => self.value.as_ref(),
        };
        match erased {
            None => Ok(None),
            Some(erased) => erased.downcast::<T>().map(Some).ok_or_else(|| {
                StreamsError::config(format!(
                    "default {} serde encodes {} but {} is required; \
                     set an explicit serde or change the default",
                    role,
                    erased.type_name(),
                    type_name::<T>()
                ))
            }),
        }
    }

    /// Default key codec downcast to `K`.
    pub fn key<K: 'static>(&self) -> Result<Option<Arc<dyn Serde<K>>>> {
        self.get(SerdeRole::Key)
    }

    /// Default value codec downcast to `V`.
    pub fn value<V: 'static>(&self) -> Result<Option<Arc<dyn Serde<V>>>> {
        self.get(SerdeRole::Value)
    }
}

fn erased_builtin(kind: SerdeKind) -> ErasedSerde {
    match kind {
        SerdeKind::String => ErasedSerde::new(Serdes::string()),
        SerdeKind::Long => ErasedSerde::new(Serdes::long()),
        SerdeKind::Bytes => ErasedSerde::new(Serdes::bytes()),
    }
}

/// A composite codec whose inner codecs may still be unset.
///
/// Resolution receives both ambient defaults so that, for example, a
/// value-and-timestamp envelope can wrap the default *value* codec, or a
/// windowed key codec can wrap the default *key* codec.
pub trait WrappingSerde<T>: Send + Sync {
    /// Build the final codec, filling unset inner codecs from `defaults`.
    fn resolve(&self, defaults: &DefaultSerdes) -> Result<Arc<dyn Serde<T>>>;
}

/// A codec as configured at construction time.
pub enum SerdeSlot<T> {
    /// No codec given; the ambient default for the role is used
    Unset,
    /// Explicit codec
    Explicit(Arc<dyn Serde<T>>),
    /// Composite codec resolved against both defaults
    Wrapping(Arc<dyn WrappingSerde<T>>),
}

impl<T> SerdeSlot<T> {
    /// True if no codec was given.
    pub fn is_unset(&self) -> bool {
        matches!(self, SerdeSlot::Unset)
    }
}

impl<T> Clone for SerdeSlot<T> {
    fn clone(&self) -> Self {
        match self {
            SerdeSlot::Unset => SerdeSlot::Unset,
            SerdeSlot::Explicit(serde) => SerdeSlot::Explicit(Arc::clone(serde)),
            SerdeSlot::Wrapping(wrapping) => SerdeSlot::Wrapping(Arc::clone(wrapping)),
        }
    }
}

impl<T> Default for SerdeSlot<T> {
    fn default() -> Self {
        SerdeSlot::Unset
    }
}

impl<T> fmt::Debug for SerdeSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerdeSlot::Unset => write!(f, "Unset"),
            SerdeSlot::Explicit(serde) => write!(f, "Explicit({})", serde.serde_id()),
            SerdeSlot::Wrapping(_) => write!(f, "Wrapping"),
        }
    }
}

impl<T> From<Arc<dyn Serde<T>>> for SerdeSlot<T> {
    fn from(serde: Arc<dyn Serde<T>>) -> Self {
        SerdeSlot::Explicit(serde)
    }
}

impl<T> From<Option<Arc<dyn Serde<T>>>> for SerdeSlot<T> {
    fn from(serde: Option<Arc<dyn Serde<T>>>) -> Self {
        match serde {
            Some(serde) => SerdeSlot::Explicit(serde),
            None => SerdeSlot::Unset,
        }
    }
}

fn prepare_serde<T: 'static>(
    slot: &SerdeSlot<T>,
    role: SerdeRole,
    defaults: &DefaultSerdes,
) -> Result<Arc<dyn Serde<T>>> {
    match slot {
        SerdeSlot::Explicit(serde) => Ok(Arc::clone(serde)),
        SerdeSlot::Wrapping(wrapping) => wrapping.resolve(defaults),
        SerdeSlot::Unset => {
            let resolved = defaults.get::<T>(role)?.ok_or_else(|| {
                StreamsError::config(format!(
                    "no {role} serde was specified and no default {role} serde is configured; \
                     please specify a {role} serde or set one through the default {role} serde config"
                ))
            })?;
            debug!(
                target: "strata::serdes",
                role = %role,
                serde = resolved.serde_id(),
                "Using default serde"
            );
            Ok(resolved)
        }
    }
}

/// Resolve a key codec slot against the ambient defaults.
pub fn prepare_key_serde<K: 'static>(
    slot: &SerdeSlot<K>,
    defaults: &DefaultSerdes,
) -> Result<Arc<dyn Serde<K>>> {
    prepare_serde(slot, SerdeRole::Key, defaults)
}

/// Resolve a value codec slot against the ambient defaults.
pub fn prepare_value_serde<V: 'static>(
    slot: &SerdeSlot<V>,
    defaults: &DefaultSerdes,
) -> Result<Arc<dyn Serde<V>>> {
    prepare_serde(slot, SerdeRole::Value, defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serdes::{LongSerde, StringSerde};

    struct PrefixedString {
        inner: Option<Arc<dyn Serde<String>>>,
    }

    struct Prefixed(Arc<dyn Serde<String>>);

    impl Serde<String> for Prefixed {
        fn serialize(&self, topic: &str, data: &String) -> std::result::Result<Vec<u8>, crate::serdes::SerdeError> {
            let mut out = b">".to_vec();
            out.extend(self.0.serialize(topic, data)?);
            Ok(out)
        }

        fn deserialize(&self, topic: &str, data: &[u8]) -> std::result::Result<String, crate::serdes::SerdeError> {
            self.0.deserialize(topic, &data[1..])
        }

        fn serde_id(&self) -> &str {
            "prefixed"
        }
    }

    impl WrappingSerde<String> for PrefixedString {
        fn resolve(&self, defaults: &DefaultSerdes) -> Result<Arc<dyn Serde<String>>> {
            let inner = match &self.inner {
                Some(inner) => Arc::clone(inner),
                None => defaults
                    .key::<String>()?
                    .ok_or_else(|| StreamsError::config("no inner serde"))?,
            };
            Ok(Arc::new(Prefixed(inner)))
        }
    }

    #[test]
    fn test_explicit_wins_over_default() {
        let defaults = DefaultSerdes::new(Serdes::string(), Serdes::string());
        let slot: SerdeSlot<i64> = SerdeSlot::Explicit(Serdes::long());
        let serde = prepare_value_serde(&slot, &defaults).unwrap();
        assert_eq!(serde.serde_id(), "long");
    }

    #[test]
    fn test_unset_takes_default_for_role() {
        let defaults = DefaultSerdes::new(Serdes::string(), Serdes::long());
        let key = prepare_key_serde::<String>(&SerdeSlot::Unset, &defaults).unwrap();
        let value = prepare_value_serde::<i64>(&SerdeSlot::Unset, &defaults).unwrap();
        assert_eq!(key.serde_id(), "string");
        assert_eq!(value.serde_id(), "long");
    }

    #[test]
    fn test_unset_without_default_is_config_error() {
        let result = prepare_key_serde::<String>(&SerdeSlot::Unset, &DefaultSerdes::none());
        assert!(matches!(result, Err(StreamsError::Config(_))));
    }

    #[test]
    fn test_default_of_wrong_type_is_config_error() {
        let defaults = DefaultSerdes::none().with_value(Serdes::long());
        let result = prepare_value_serde::<String>(&SerdeSlot::Unset, &defaults);
        match result {
            Err(StreamsError::Config(msg)) => assert!(msg.contains("i64")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_wrapping_resolves_against_defaults() {
        let defaults = DefaultSerdes::none().with_key(Serdes::string());
        let slot: SerdeSlot<String> = SerdeSlot::Wrapping(Arc::new(PrefixedString { inner: None }));
        let serde = prepare_value_serde(&slot, &defaults).unwrap();
        assert_eq!(serde.serialize("t", &"a".to_string()).unwrap(), b">a");
    }

    #[test]
    fn test_erased_downcast() {
        let erased = ErasedSerde::new::<i64>(Arc::new(LongSerde));
        assert!(erased.downcast::<i64>().is_some());
        assert!(erased.downcast::<String>().is_none());
        let _ = StringSerde;
    }

    #[test]
    fn test_from_config() {
        let config = StreamsConfig::from_toml_str(
            "application_id = \"app\"\ndefault_key_serde = \"string\"\n",
        )
        .unwrap();
        let defaults = DefaultSerdes::from_config(&config);
        assert!(defaults.key::<String>().unwrap().is_some());
        assert!(defaults.value::<String>().unwrap().is_none());
    }
}
