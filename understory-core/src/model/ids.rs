//! Nominal wrappers around primitive identifiers
//!
//! Each wrapper is a distinct type so a `ShardId` can never be passed where a
//! `FilePath` is expected.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt::{self, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Hex prefix of a SHA-256 digest, used for blob names.
pub(crate) fn stable_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8]) // 16-char hex prefix
}

/// Repo-relative POSIX path of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilePath(String);

impl FilePath {
    /// Normalizes separators and strips leading `./` or `/`.
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        let mut normalized = raw.replace('\\', "/");
        while let Some(rest) = normalized.strip_prefix("./") {
            normalized = rest.to_string();
        }
        Self(normalized.trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shard that owns this file (its parent directory).
    pub fn shard_id(&self) -> ShardId {
        ShardId::for_path(self)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

impl Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FilePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FilePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FilePath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// POSIX parent directory of the files placed in a shard.
///
/// Files at the repository root land in the `"."` shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub const ROOT: &'static str = ".";

    pub fn new(dir: impl Into<String>) -> Self {
        let dir: String = dir.into();
        let trimmed = dir.trim_matches('/');
        if trimmed.is_empty() {
            Self(Self::ROOT.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn for_path(path: &FilePath) -> Self {
        match path.as_str().rsplit_once('/') {
            Some((dir, _)) => Self::new(dir),
            None => Self::new(Self::ROOT),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash used in every blob name derived from this shard.
    pub fn blob_hash(&self) -> String {
        stable_hash(&self.0)
    }

    /// Blob holding this shard's file entries and intra-shard edges.
    pub fn blob_name(&self) -> String {
        format!("{}.json", self.blob_hash())
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ShardId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Commit identifier in the hosted repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(String);

impl CommitSha {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Abbreviated form for log lines and commit messages.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of model tokens.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenCount(usize);

impl TokenCount {
    pub const ZERO: TokenCount = TokenCount(0);

    pub fn new(count: usize) -> Self {
        Self(count)
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn saturating_sub(self, other: TokenCount) -> TokenCount {
        TokenCount(self.0.saturating_sub(other.0))
    }

    /// Share of this budget, rounded down.
    pub fn scaled(self, ratio: f64) -> TokenCount {
        if ratio <= 0.0 || !ratio.is_finite() {
            return TokenCount::ZERO;
        }
        TokenCount(((self.0 as f64) * ratio.min(1.0)).floor() as usize)
    }
}

impl Display for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for TokenCount {
    type Output = TokenCount;

    fn add(self, rhs: TokenCount) -> TokenCount {
        TokenCount(self.0 + rhs.0)
    }
}

impl AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: TokenCount) {
        self.0 += rhs.0;
    }
}

impl Sum for TokenCount {
    fn sum<I: Iterator<Item = TokenCount>>(iter: I) -> TokenCount {
        iter.fold(TokenCount::ZERO, |acc, t| acc + t)
    }
}

impl<'a> Sum<&'a TokenCount> for TokenCount {
    fn sum<I: Iterator<Item = &'a TokenCount>>(iter: I) -> TokenCount {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_id_is_parent_directory() {
        let path = FilePath::new("src/auth/login.py");
        assert_eq!(path.shard_id(), ShardId::new("src/auth"));
        assert_eq!(FilePath::new("setup.py").shard_id().as_str(), ".");
    }

    #[test]
    fn file_path_normalizes_separators() {
        assert_eq!(FilePath::new("./src\\db\\models.py").as_str(), "src/db/models.py");
        assert_eq!(FilePath::new("/README.md").as_str(), "README.md");
    }

    #[test]
    fn co_located_files_share_a_blob() {
        let a = FilePath::new("src/db/models.py").shard_id();
        let b = FilePath::new("src/db/session.py").shard_id();
        assert_eq!(a.blob_name(), b.blob_name());
        assert_ne!(a.blob_name(), ShardId::new("src/auth").blob_name());
        assert!(a.blob_name().ends_with(".json"));
    }

    #[test]
    fn extension_ignores_dotfiles() {
        assert_eq!(FilePath::new("a/b.tsx").extension(), Some("tsx"));
        assert_eq!(FilePath::new("a/.gitignore").extension(), None);
        assert_eq!(FilePath::new("Makefile").extension(), None);
    }

    #[test]
    fn token_count_scaling_rounds_down() {
        let budget = TokenCount::new(1000);
        assert_eq!(budget.scaled(0.25), TokenCount::new(250));
        assert_eq!(budget.scaled(-1.0), TokenCount::ZERO);
        assert_eq!(budget.scaled(2.0), budget);
        let total: TokenCount = [TokenCount::new(3), TokenCount::new(4)].iter().sum();
        assert_eq!(total.get(), 7);
    }
}
