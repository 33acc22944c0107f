//! Core types for the Meridian component kernel.
//!
//! This crate provides the version algebra shared by the dependency graph,
//! the component manager and the system package layer:
//! - Semantic and date-based versions with total ordering
//! - Version ranges with endpoint inclusivity
//! - Constraint-string evaluation with comparison strategies
//! - Error types

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
mod range;
mod version;

pub use error::{Error, Result};
pub use range::VersionRange;
pub use version::{
    check_date_version, check_version, CompareStrategy, DateVersion, Version,
};
