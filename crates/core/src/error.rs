//! Error types for the state-store layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The taxonomy follows the way callers react to a failure:
//! - configuration errors (`Config`, `NotInitialized`) are fatal and never retried
//! - codec errors (`Serialization`) are fatal for the call that hit them
//! - raw-store errors (`Storage`, `ProcessorState`) are propagated with the
//!   original cause preserved
//!
//! "Capability not supported" outcomes are *not* errors; they are plain
//! booleans (see `CachedStateStore::set_flush_listener`).

use std::io;
use thiserror::Error;

/// Result type alias for state-store operations
pub type Result<T> = std::result::Result<T, StreamsError>;

/// Boxed error used as the preserved cause of an annotated failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for the state-store layer
#[derive(Debug, Error)]
pub enum StreamsError {
    /// I/O error (config file access)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error: a codec could not be resolved, a default codec
    /// has the wrong type, or a config file is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A data operation was invoked on a store that is not initialized
    /// (never initialized, or already closed)
    #[error("Store {store} is not initialized")]
    NotInitialized {
        /// Name of the store
        store: String,
    },

    /// Encode/decode failure
    #[error("Serialization error on topic {topic}: {message}")]
    Serialization {
        /// Topic (changelog or source) the codec was invoked for
        topic: String,
        /// Description of the failure
        message: String,
    },

    /// Raw store failure annotated with typed key/value context
    #[error("{message}")]
    ProcessorState {
        /// Diagnostic message including the store name and typed key/value
        message: String,
        /// Original failure
        #[source]
        source: BoxError,
    },

    /// Raw store failure as reported by the storage engine
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl StreamsError {
    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        StreamsError::Config(message.into())
    }

    /// Build a not-initialized error for `store`
    pub fn not_initialized(store: impl Into<String>) -> Self {
        StreamsError::NotInitialized {
            store: store.into(),
        }
    }

    /// Build a serialization error
    pub fn serialization(topic: impl Into<String>, message: impl Into<String>) -> Self {
        StreamsError::Serialization {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Wrap `source` with a diagnostic message
    pub fn processor_state(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StreamsError::ProcessorState {
            message: message.into(),
            source: source.into(),
        }
    }

    /// True for failures that originate in the raw store
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StreamsError::Storage(_) | StreamsError::ProcessorState { .. }
        )
    }
}
