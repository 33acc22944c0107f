//! OS package-manager registry and external dependency planning.
//!
//! Components may declare `system:`-prefixed dependencies; this crate plans
//! how to satisfy them. A [`PackageManagerRegistry`] knows the command
//! templates of the platform's package managers (probed at startup and
//! overridable from a JSON config), and a [`DependencyManager`] tracks
//! declared packages, drives install/uninstall plans and persists an
//! installation cache. Actual shell execution sits behind the
//! [`CommandRunner`] seam; the kernel itself only builds and parses
//! commands.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
mod manager;
mod platform;
mod registry;
mod runner;

pub use error::{DependencyError, DependencyErrorCode, DependencyResult};
pub use manager::{DependencyManager, PackageDependency};
pub use platform::{DistroType, PlatformDetector};
pub use registry::{PackageManagerInfo, PackageManagerRegistry};
pub use runner::{CommandRunner, SystemRunner};
