//! Hosted version-control collaborator
//!
//! Git-data primitives for the index branch plus the pull-request level
//! lookups the pipeline needs. Transport and API failures surface as
//! `UnderstoryError::Publish`.

use crate::model::{CommitSha, FilePath};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Entry of a tree being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl NewTreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            kind: "blob".to_string(),
            sha: sha.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl FileChangeStatus {
    /// Unrecognised statuses (`copied`, `changed`, ...) count as modified.
    pub fn parse(s: &str) -> Self {
        match s {
            "added" => Self::Added,
            "removed" | "deleted" => Self::Removed,
            "renamed" => Self::Renamed,
            _ => Self::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: FilePath,
    pub status: FileChangeStatus,
    pub previous_path: Option<FilePath>,
    pub patch: Option<String>,
}

impl ChangedFile {
    pub fn new(path: impl Into<FilePath>, status: FileChangeStatus) -> Self {
        Self {
            path: path.into(),
            status,
            previous_path: None,
            patch: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.status == FileChangeStatus::Removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head_sha: CommitSha,
    pub base_sha: CommitSha,
}

pub trait VcsClient: Send + Sync {
    /// Tip of `branch`, or `None` when the branch does not exist.
    fn get_ref_sha(&self, branch: &str) -> Result<Option<CommitSha>>;
    fn get_commit_tree_sha(&self, commit: &CommitSha) -> Result<String>;
    fn get_tree_entries_flat(&self, tree_sha: &str) -> Result<Vec<TreeEntry>>;
    fn get_blob_content(&self, blob_sha: &str) -> Result<Vec<u8>>;

    fn create_blob(&self, content: &[u8]) -> Result<String>;
    fn create_tree(&self, entries: &[NewTreeEntry]) -> Result<String>;
    fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[CommitSha],
    ) -> Result<CommitSha>;
    fn create_ref(&self, branch: &str, commit: &CommitSha) -> Result<()>;
    /// Fast-forward only; a ref that moved since it was read is an error.
    fn update_ref(&self, branch: &str, commit: &CommitSha) -> Result<()>;

    fn get_pull_request(&self, number: u64) -> Result<PullRequest>;
    fn pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>>;
    fn get_pull_request_diff(&self, number: u64) -> Result<String>;
    fn compare_commits(&self, base: &CommitSha, head: &CommitSha) -> Result<Vec<ChangedFile>>;
    /// File text at `git_ref`, or `None` if the file is absent there.
    fn get_file_content(&self, path: &FilePath, git_ref: &str) -> Result<Option<String>>;
}

macro_rules! forward_vcs_client {
    ($($ty:ty),*) => {$(
        impl<T: VcsClient + ?Sized> VcsClient for $ty {
            fn get_ref_sha(&self, branch: &str) -> Result<Option<CommitSha>> {
                (**self).get_ref_sha(branch)
            }
            fn get_commit_tree_sha(&self, commit: &CommitSha) -> Result<String> {
                (**self).get_commit_tree_sha(commit)
            }
            fn get_tree_entries_flat(&self, tree_sha: &str) -> Result<Vec<TreeEntry>> {
                (**self).get_tree_entries_flat(tree_sha)
            }
            fn get_blob_content(&self, blob_sha: &str) -> Result<Vec<u8>> {
                (**self).get_blob_content(blob_sha)
            }
            fn create_blob(&self, content: &[u8]) -> Result<String> {
                (**self).create_blob(content)
            }
            fn create_tree(&self, entries: &[NewTreeEntry]) -> Result<String> {
                (**self).create_tree(entries)
            }
            fn create_commit(
                &self,
                message: &str,
                tree_sha: &str,
                parents: &[CommitSha],
            ) -> Result<CommitSha> {
                (**self).create_commit(message, tree_sha, parents)
            }
            fn create_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
                (**self).create_ref(branch, commit)
            }
            fn update_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
                (**self).update_ref(branch, commit)
            }
            fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
                (**self).get_pull_request(number)
            }
            fn pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
                (**self).pull_request_files(number)
            }
            fn get_pull_request_diff(&self, number: u64) -> Result<String> {
                (**self).get_pull_request_diff(number)
            }
            fn compare_commits(
                &self,
                base: &CommitSha,
                head: &CommitSha,
            ) -> Result<Vec<ChangedFile>> {
                (**self).compare_commits(base, head)
            }
            fn get_file_content(&self, path: &FilePath, git_ref: &str) -> Result<Option<String>> {
                (**self).get_file_content(path, git_ref)
            }
        }
    )*};
}

forward_vcs_client!(&T, Arc<T>, Box<T>);
