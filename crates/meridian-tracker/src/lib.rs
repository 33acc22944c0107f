//! File tracking for change detection and hot reload.
//!
//! A [`FileTracker`] snapshots the files of a directory (path, modification
//! time, SHA-256 content hash, size, extension), persists the snapshot as
//! JSON (optionally AES-GCM encrypted at rest), diffs successive snapshots
//! into new/deleted/modified classifications with unified-diff bodies, and
//! can watch the directory in the background with a debounced poll and a
//! bounded mtime cache.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod diff;
pub mod error;
mod snapshot;
mod tracker;

pub use diff::{compare_snapshots, Change, ChangeStatus, Differences};
pub use error::{Result, TrackerError};
pub use snapshot::{FileEntry, Snapshot};
pub use tracker::{ChangeCallback, FileStats, FileTracker};
