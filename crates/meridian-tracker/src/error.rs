//! Error types for file tracking.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the file tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The tracked root is not an existing directory.
    #[error("tracked directory does not exist: {path}")]
    InvalidRoot {
        /// The configured root.
        path: PathBuf,
    },

    /// Filesystem access failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be serialized or deserialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),

    /// The snapshot could not be decrypted; usually a wrong key.
    #[error("snapshot decryption failed")]
    Decryption,

    /// The snapshot could not be encrypted.
    #[error("snapshot encryption failed: {0}")]
    Encryption(String),

    /// A configuration value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A background task failed to complete.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl TrackerError {
    /// Create an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
