//! Path utilities for tessera
//!
//! Handles XDG Base Directory specification compliance for config,
//! state, log, and runtime directories.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Application identifier for XDG directories
const APP_NAME: &str = "tessera";

/// Get project directories
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the Unix socket path for client-server communication
///
/// Location: `$XDG_RUNTIME_DIR/tessera/tessera.sock` or `/tmp/tessera-$UID/tessera.sock`
pub fn socket_path() -> PathBuf {
    runtime_dir().join("tessera.sock")
}

/// Get the runtime directory
///
/// Location: `$XDG_RUNTIME_DIR/tessera` or `/tmp/tessera-$UID`
pub fn runtime_dir() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(xdg_runtime).join(APP_NAME)
    } else {
        // Fallback to /tmp with UID for security
        // SAFETY: getuid() is always safe to call
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
    }
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/tessera` or `~/.config/tessera`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback(".config"))
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/tessera/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the state directory (server-side durable scratch, e.g. pid files)
///
/// Location: `$XDG_STATE_HOME/tessera` or `~/.local/state/tessera`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| home_fallback(".local/state"))
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/tessera/logs`
pub fn log_dir() -> PathBuf {
    state_dir().join("logs")
}

fn home_fallback(prefix: &str) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(prefix).join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_ends_with_sock() {
        let path = socket_path();
        assert_eq!(path.file_name().unwrap(), "tessera.sock");
    }

    #[test]
    fn test_runtime_dir_contains_app_name() {
        let dir = runtime_dir();
        assert!(dir.to_string_lossy().contains("tessera"));
    }

    #[test]
    fn test_config_file_is_toml() {
        let file = config_file();
        assert_eq!(file.extension().unwrap(), "toml");
    }

    #[test]
    fn test_log_dir_under_state() {
        assert!(log_dir().starts_with(state_dir()));
    }
}
