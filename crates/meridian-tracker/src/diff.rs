//! Snapshot comparison: new / deleted / modified classification.

use crate::snapshot::{FileEntry, Snapshot};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::BTreeMap;
use std::fmt;

/// How a tracked path changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Present in the new snapshot only.
    New,
    /// Present in the old snapshot only.
    Deleted,
    /// Present in both with differing content hashes.
    Modified,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Deleted => write!(f, "deleted"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// A single path's change, with a unified diff body for modifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Classification of the change.
    pub status: ChangeStatus,
    /// Unified diff of the entries' JSON representations; empty unless
    /// `status` is [`ChangeStatus::Modified`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<String>,
}

/// All detected changes, keyed by path.
pub type Differences = BTreeMap<String, Change>;

fn entry_diff(old: &FileEntry, new: &FileEntry) -> Vec<String> {
    let old_text = serde_json::to_string_pretty(old).unwrap_or_default();
    let new_text = serde_json::to_string_pretty(new).unwrap_or_default();
    let text_diff = TextDiff::from_lines(&old_text, &new_text);
    text_diff
        .unified_diff()
        .header("old", "new")
        .to_string()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Compare two snapshots.
///
/// Paths only in `new` are [`ChangeStatus::New`], paths only in `old` are
/// [`ChangeStatus::Deleted`], and paths in both whose hashes differ are
/// [`ChangeStatus::Modified`] with a unified diff of the entry metadata.
#[must_use]
pub fn compare_snapshots(old: &Snapshot, new: &Snapshot) -> Differences {
    let mut differences = Differences::new();

    for (path, new_entry) in new {
        match old.get(path) {
            Some(old_entry) => {
                if old_entry.hash != new_entry.hash {
                    differences.insert(
                        path.clone(),
                        Change {
                            status: ChangeStatus::Modified,
                            diff: entry_diff(old_entry, new_entry),
                        },
                    );
                }
            }
            None => {
                differences.insert(
                    path.clone(),
                    Change {
                        status: ChangeStatus::New,
                        diff: Vec::new(),
                    },
                );
            }
        }
    }

    for path in old.keys() {
        if !new.contains_key(path) {
            differences.insert(
                path.clone(),
                Change {
                    status: ChangeStatus::Deleted,
                    diff: Vec::new(),
                },
            );
        }
    }

    differences
}
