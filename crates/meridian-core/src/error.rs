//! Error types for version parsing and evaluation.

use thiserror::Error;

/// Errors produced by the version algebra.
///
/// Every malformed version, date, range or constraint surfaces as
/// [`Error::InvalidVersion`] carrying the offending substring, so callers can
/// report exactly which fragment of their input failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A version, date, range or constraint string could not be parsed.
    #[error("invalid version '{input}'")]
    InvalidVersion {
        /// The offending substring.
        input: String,
    },
}

impl Error {
    /// Create an invalid-version error from the offending input.
    #[must_use]
    pub fn invalid(input: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.into(),
        }
    }
}

/// Result type for version operations.
pub type Result<T> = std::result::Result<T, Error>;
