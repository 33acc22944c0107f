//! Error types for the system dependency layer.

use std::fmt;
use thiserror::Error;

/// Enumerated failure codes for package operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyErrorCode {
    /// No registered package manager matched.
    PackageManagerNotFound,
    /// An install command failed.
    InstallFailed,
    /// An uninstall command failed.
    UninstallFailed,
    /// The dependency is not declared.
    DependencyNotFound,
    /// A configuration file could not be loaded.
    ConfigLoadFailed,
    /// A version string was malformed or incompatible.
    InvalidVersion,
    /// A network-backed operation failed.
    NetworkError,
    /// The operation was denied by the system.
    PermissionDenied,
    /// Anything else.
    UnknownError,
}

impl fmt::Display for DependencyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PackageManagerNotFound => "package manager not found",
            Self::InstallFailed => "install failed",
            Self::UninstallFailed => "uninstall failed",
            Self::DependencyNotFound => "dependency not found",
            Self::ConfigLoadFailed => "config load failed",
            Self::InvalidVersion => "invalid version",
            Self::NetworkError => "network error",
            Self::PermissionDenied => "permission denied",
            Self::UnknownError => "unknown error",
        };
        write!(f, "{name}")
    }
}

/// A failed package operation: code, message and optional context tags.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct DependencyError {
    /// What kind of failure this is.
    pub code: DependencyErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Free-form context tags (dependency name, command, ...).
    pub context: Vec<String>,
}

impl DependencyError {
    /// Create an error from a code and message.
    #[must_use]
    pub fn new(code: DependencyErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Attach a context tag.
    #[must_use]
    pub fn with_context(mut self, tag: impl Into<String>) -> Self {
        self.context.push(tag.into());
        self
    }

    /// Shorthand for a missing-dependency error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(
            DependencyErrorCode::DependencyNotFound,
            format!("dependency '{name}' is not declared"),
        )
    }

    /// Shorthand for a missing package manager.
    #[must_use]
    pub fn no_manager(name: &str) -> Self {
        Self::new(
            DependencyErrorCode::PackageManagerNotFound,
            format!("no package manager named '{name}' is available"),
        )
    }
}

/// Result type for package operations.
pub type DependencyResult<T> = std::result::Result<T, DependencyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = DependencyError::new(DependencyErrorCode::InstallFailed, "apt exited 100")
            .with_context("openssl");
        assert_eq!(err.to_string(), "[install failed] apt exited 100");
        assert_eq!(err.context, vec!["openssl"]);
    }
}
