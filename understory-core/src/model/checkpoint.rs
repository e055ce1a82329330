//! Known-good index point and incremental update planning

use super::{CommitSha, FilePath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub commit: CommitSha,
    #[serde(default)]
    pub file_count: usize,
}

impl Checkpoint {
    pub fn new(commit: CommitSha, file_count: usize) -> Self {
        Self { commit, file_count }
    }

    pub const BLOB_NAME: &'static str = "checkpoint.json";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    FullRebuild { reason: String },
    Incremental {
        changed: Vec<FilePath>,
        removed: Vec<FilePath>,
    },
}

impl UpdatePlan {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::FullRebuild { .. })
    }
}

/// Decide between an incremental update and a full rebuild.
///
/// `changes` is the result of comparing the checkpoint commit with `head`:
/// `None` means the comparison was unavailable. Each change is a path plus
/// whether the file was removed.
pub fn plan_update(
    checkpoint: Option<&Checkpoint>,
    head: &CommitSha,
    changes: Option<Vec<(FilePath, bool)>>,
    threshold: usize,
) -> UpdatePlan {
    let Some(checkpoint) = checkpoint else {
        return UpdatePlan::FullRebuild {
            reason: "no checkpoint".to_string(),
        };
    };
    if checkpoint.commit == *head {
        return UpdatePlan::Incremental {
            changed: Vec::new(),
            removed: Vec::new(),
        };
    }
    let Some(changes) = changes else {
        return UpdatePlan::FullRebuild {
            reason: format!("cannot compare {} with {}", checkpoint.commit.short(), head.short()),
        };
    };
    if changes.len() > threshold {
        return UpdatePlan::FullRebuild {
            reason: format!("{} files changed (threshold {threshold})", changes.len()),
        };
    }

    let mut changed = Vec::new();
    let mut removed = Vec::new();
    for (path, is_removed) in changes {
        if is_removed {
            removed.push(path);
        } else {
            changed.push(path);
        }
    }
    changed.sort();
    changed.dedup();
    removed.sort();
    removed.dedup();
    UpdatePlan::Incremental { changed, removed }
}
