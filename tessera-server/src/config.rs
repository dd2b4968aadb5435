//! Server configuration schema and loader
//!
//! All tunables are read from `config.toml` in the XDG config dir and
//! passed by reference into the engine pieces at construction. There is no
//! ambient global configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_utils::{config_file, Result, TesseraError};

/// Root server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket: SocketConfig,
    pub limits: LimitsConfig,
    pub token: TokenConfig,
}

/// Listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Unix socket path override; defaults to the XDG runtime dir
    pub path: Option<PathBuf>,
    /// Optional additional TCP listen address, e.g. "127.0.0.1:4461"
    pub tcp_listen: Option<String>,
}

/// Resource bounds, read-only inputs to the connection machinery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum payload chunk size before fragmentation
    pub max_chunk_size: usize,
    /// Per-client outgoing queue depth; overflow is logged and dropped
    pub max_queued_messages: usize,
    /// Bound on concurrently served connections
    pub worker_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 8_192,
            max_queued_messages: 64,
            worker_limit: 16,
        }
    }
}

/// Token handoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// How long a pending give may stay unresolved before the token
    /// reverts to not-in-use
    pub give_timeout_ms: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            give_timeout_ms: 30_000,
        }
    }
}

/// Load configuration from the default XDG location, falling back to
/// defaults when no file exists
pub fn load() -> Result<ServerConfig> {
    let path = config_file();
    if path.exists() {
        load_from(&path)
    } else {
        Ok(ServerConfig::default())
    }
}

/// Load configuration from an explicit path
pub fn load_from(path: &Path) -> Result<ServerConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| TesseraError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&raw).map_err(|e| TesseraError::ConfigInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
