//! Error types for xapsd.

use std::path::PathBuf;

/// Main error type for daemon operations.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Registration store error.
    #[error("registration store error: {0}")]
    Store(#[from] StoreError),

    /// Gateway transport error.
    #[error("gateway transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// The command socket path is already bound.
    #[error("socket path already exists: {path} (remove it or stop the other daemon)")]
    SocketPathExists {
        /// The configured socket path.
        path: PathBuf,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registration store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persisted file exists but cannot be read.
    #[error("failed to read registration file {path}: {source}")]
    Read {
        /// Path to the registration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The persisted file exists but cannot be parsed.
    ///
    /// Treated as fatal at startup: running with a silently-empty store
    /// would mask data loss.
    #[error("registration file {path} is corrupt: {source}")]
    Corrupt {
        /// Path to the registration file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Rewriting the persisted file failed; the mutation is not committed.
    #[error("failed to write registration file {path}: {source}")]
    Write {
        /// Path to the registration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
