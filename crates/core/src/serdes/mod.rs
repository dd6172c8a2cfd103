//! Codecs between typed domain values and raw bytes.
//!
//! Every typed store operation goes through a [`Serde`]. Stores are built
//! with a [`SerdeSlot`] per role and bind the final codecs at init time
//! (see [`resolver`]), producing an immutable [`StateSerdes`].
//!
//! # Usage
//!
//! ```
//! use strata_core::serdes::{prepare_key_serde, DefaultSerdes, SerdeSlot, Serdes};
//!
//! let defaults = DefaultSerdes::new(Serdes::string(), Serdes::long());
//! let key = prepare_key_serde::<String>(&SerdeSlot::Unset, &defaults).unwrap();
//! assert_eq!(key.serde_id(), "string");
//! ```

mod builtin;
pub mod resolver;
mod state_serdes;
mod traits;
pub mod value_and_timestamp;

pub use builtin::{BincodeSerde, BytesSerde, JsonSerde, LongSerde, Serdes, StringSerde};
pub use resolver::{
    prepare_key_serde, prepare_value_serde, DefaultSerdes, ErasedSerde, SerdeRole, SerdeSlot,
    WrappingSerde,
};
pub use state_serdes::{store_changelog_topic, StateSerdes};
pub use traits::{Serde, SerdeError};
pub use value_and_timestamp::ValueAndTimestampSerde;
