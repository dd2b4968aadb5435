//! Error types for tessera
//!
//! Provides a unified error type used across all tessera crates.

use std::path::PathBuf;

/// Main error type for tessera operations
#[derive(Debug, thiserror::Error)]
pub enum TesseraError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Timed out after {millis}ms waiting for a reply")]
    TimedOut { millis: u64 },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol version mismatch: client={client}, server={server}")]
    ProtocolMismatch { client: u32, server: u32 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    // === State Conflicts ===
    //
    // Returned by mutating shared-object calls whose holder-state
    // preconditions do not hold. Never silently swallowed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Client is not holding the token: {0}")]
    ClientNotGrabbing(String),

    #[error("Client could not be released: {0}")]
    ClientNotReleased(String),

    // === Naming Errors ===

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("Name already in use: {0}")]
    NameInUse(String),

    #[error("Name is not bound: {0}")]
    NotBound(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// TimedOut is the only failure the caller may safely retry whole:
    /// the request was at-most-once and the slot has already been reset.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Connection(_))
    }

    /// Check if this error is a holder-state conflict
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::ClientNotGrabbing(_) | Self::ClientNotReleased(_)
        )
    }
}

/// Result type alias using TesseraError
pub type Result<T> = std::result::Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TesseraError::SessionNotFound("chalkboard".into());
        assert_eq!(err.to_string(), "Session not found: chalkboard");
    }

    #[test]
    fn test_retryable() {
        assert!(TesseraError::TimedOut { millis: 5000 }.is_retryable());
        assert!(TesseraError::Connection("refused".into()).is_retryable());
        assert!(!TesseraError::PermissionDenied("t1".into()).is_retryable());
    }

    #[test]
    fn test_state_conflicts() {
        assert!(TesseraError::ClientNotGrabbing("alice".into()).is_state_conflict());
        assert!(TesseraError::ClientNotReleased("alice".into()).is_state_conflict());
        assert!(!TesseraError::TimedOut { millis: 1 }.is_state_conflict());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: TesseraError = io_err.into();
        assert!(matches!(err, TesseraError::Io(_)));
    }
}
