//! Client configuration
//!
//! Read from `config.toml` in the XDG config dir and passed into the
//! connection at construction; the engine never mutates it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_utils::{config_file, Result, TesseraError};

/// Client-side tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for a request's reply
    pub request_timeout_ms: u64,
    /// Keep-alive ping cadence
    pub keepalive_interval_ms: u64,
    /// Maximum payload chunk size before fragmentation
    pub max_chunk_size: usize,
    /// Outgoing queue depth and event queue depth
    pub max_queued_messages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            keepalive_interval_ms: 10_000,
            max_chunk_size: 8_192,
            max_queued_messages: 64,
        }
    }
}

impl ClientConfig {
    /// Load from the default XDG location, falling back to defaults when
    /// no file exists
    pub fn load() -> Result<Self> {
        let path = config_file();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| TesseraError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&raw).map_err(|e| TesseraError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.keepalive_interval_ms, 10_000);
        assert_eq!(config.max_chunk_size, 8_192);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_ms = 1500").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.request_timeout_ms, 1_500);
        assert_eq!(config.max_queued_messages, 64);
    }
}
