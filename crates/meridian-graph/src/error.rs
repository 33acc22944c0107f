//! Error types for graph and manifest operations.

use meridian_core::Version;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the dependency graph and the manifest resolver.
#[derive(Error, Debug)]
pub enum GraphError {
    /// An edge referenced a node that is not in the graph.
    #[error("dependency '{node}' not found in graph")]
    MissingNode {
        /// The missing node.
        node: String,
    },

    /// A dependency edge's version requirement is not met by the target node.
    #[error(
        "version requirement not satisfied for dependency {from} -> {to}: \
         required {required}, found {found}"
    )]
    VersionMismatch {
        /// The dependent node.
        from: String,
        /// The dependency node.
        to: String,
        /// The version the edge requires.
        required: Version,
        /// The version the target node actually carries.
        found: Version,
    },

    /// The graph contains a cycle.
    #[error("circular dependency detected")]
    CycleDetected,

    /// A manifest file could not be parsed.
    #[error("invalid manifest {path}: {detail}")]
    Manifest {
        /// Path of the offending manifest.
        path: PathBuf,
        /// What went wrong.
        detail: String,
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

    /// A version string inside a manifest or API call failed to parse.
    #[error(transparent)]
    Version(#[from] meridian_core::Error),

    /// A background resolution task failed to complete.
    #[error("resolution task failed: {0}")]
    TaskFailed(String),
}

impl GraphError {
    /// Create an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a manifest error with path context.
    #[must_use]
    pub fn manifest(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
