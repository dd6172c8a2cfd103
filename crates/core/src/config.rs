//! Streams configuration via `streams.toml`
//!
//! A small config file carries the settings this layer needs from the
//! surrounding application: its id (used in changelog topic names), the
//! metrics recording level, and the named default codecs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StreamsError};
use crate::metrics::RecordingLevel;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "streams.toml";

/// Built-in codec kinds that can be named as defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerdeKind {
    /// UTF-8 strings
    String,
    /// 8-byte big-endian `i64`
    Long,
    /// Raw bytes
    Bytes,
}

/// Configuration loaded from `streams.toml`.
///
/// # Example
///
/// ```toml
/// application_id = "word-count"
/// metrics_recording_level = "DEBUG"
/// default_key_serde = "string"
/// default_value_serde = "long"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    /// Application id; prefixes changelog topic names.
    pub application_id: String,
    /// `"INFO"` or `"DEBUG"`. Store-level metrics are recorded at DEBUG only.
    #[serde(default = "default_recording_level_str")]
    pub metrics_recording_level: String,
    /// Sample window for rate metrics in milliseconds.
    #[serde(default = "default_sample_window_ms")]
    pub metrics_sample_window_ms: u64,
    /// Default key codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_serde: Option<SerdeKind>,
    /// Default value codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value_serde: Option<SerdeKind>,
}

fn default_recording_level_str() -> String {
    "INFO".to_string()
}

fn default_sample_window_ms() -> u64 {
    30_000
}

impl StreamsConfig {
    /// Config with defaults for everything but the application id.
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            metrics_recording_level: default_recording_level_str(),
            metrics_sample_window_ms: default_sample_window_ms(),
            default_key_serde: None,
            default_value_serde: None,
        }
    }

    /// Parse the recording level.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"INFO"` or `"DEBUG"`.
    pub fn recording_level(&self) -> Result<RecordingLevel> {
        self.metrics_recording_level.parse()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Streams state-store configuration
#
# Application id, used as the prefix of changelog topic names.
application_id = "streams-app"

# Metrics recording level: "INFO" (default) or "DEBUG".
# Store-level latency metrics are only recorded at "DEBUG".
metrics_recording_level = "INFO"

# Sample window for rate metrics in milliseconds (default: 30000).
# metrics_sample_window_ms = 30000

# Default codecs for stores and sources built without explicit ones.
# One of "string", "long", "bytes".
# default_key_serde = "string"
# default_value_serde = "string"
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the text does not parse or the
    /// recording level is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StreamsConfig = toml::from_str(content)
            .map_err(|e| StreamsError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            StreamsError::config(format!("Invalid config file '{}': {}", path.display(), e))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StreamsError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the config for invalid values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty application id or an
    /// unknown recording level.
    pub fn validate(&self) -> Result<()> {
        if self.application_id.is_empty() {
            return Err(StreamsError::config("application_id must not be empty"));
        }
        self.recording_level()?;
        Ok(())
    }
}
