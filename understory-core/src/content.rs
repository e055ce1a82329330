//! Where file text comes from: the working tree or the hosted repository

use crate::error::UnderstoryError;
use crate::model::FilePath;
use crate::vcs::VcsClient;
use crate::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::PathBuf;

pub trait ContentSource: Send + Sync {
    fn fetch(&self, path: &FilePath) -> Result<String>;
}

impl<T: ContentSource + ?Sized> ContentSource for &T {
    fn fetch(&self, path: &FilePath) -> Result<String> {
        (**self).fetch(path)
    }
}

/// Include glob plus ignore patterns, applied to repository-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    ignore: GlobSet,
}

impl PathFilter {
    /// Bare names in `ignore_patterns` ("node_modules") exclude that
    /// directory anywhere in the tree.
    pub fn new(include_glob: &str, ignore_patterns: &[String]) -> Result<Self> {
        let glob_err = |e: globset::Error| UnderstoryError::Configuration(format!("bad glob: {e}"));

        let mut include = GlobSetBuilder::new();
        include.add(Glob::new(include_glob).map_err(glob_err)?);

        let mut ignore = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            let glob_pattern = if pattern.contains('*') || pattern.contains('?') {
                pattern.clone()
            } else {
                format!("**/{pattern}")
            };
            ignore.add(Glob::new(&glob_pattern).map_err(glob_err)?);
            ignore.add(Glob::new(&format!("**/{pattern}/**")).map_err(glob_err)?);
        }

        Ok(Self {
            include: include.build().map_err(glob_err)?,
            ignore: ignore.build().map_err(glob_err)?,
        })
    }

    pub fn matches(&self, relative: impl AsRef<std::path::Path>) -> bool {
        let relative = relative.as_ref();
        !self.ignore.is_match(relative) && self.include.is_match(relative)
    }
}

/// Files of a local checkout, respecting `.gitignore`.
pub struct LocalContentSource {
    root: PathBuf,
    filter: PathFilter,
    max_file_bytes: u64,
}

impl LocalContentSource {
    pub fn new(
        root: impl Into<PathBuf>,
        include_glob: &str,
        ignore_patterns: &[String],
        max_file_bytes: u64,
    ) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            filter: PathFilter::new(include_glob, ignore_patterns)?,
            max_file_bytes,
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Repository-relative paths of every candidate file, sorted.
    pub fn discover(&self) -> Result<Vec<FilePath>> {
        let mut builder = WalkBuilder::new(&self.root);
        builder.hidden(true);
        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if !self.filter.matches(relative) {
                continue;
            }
            if entry
                .metadata()
                .is_ok_and(|m| m.len() > self.max_file_bytes)
            {
                tracing::debug!(path = %relative.display(), "Skipping oversized file");
                continue;
            }
            files.push(FilePath::new(relative.to_string_lossy().into_owned()));
        }
        files.sort();
        Ok(files)
    }
}

impl ContentSource for LocalContentSource {
    fn fetch(&self, path: &FilePath) -> Result<String> {
        let full = self.root.join(path.as_str());
        let indexing = |message: String| UnderstoryError::Indexing {
            path: path.to_string(),
            message,
        };
        let len = std::fs::metadata(&full)
            .map_err(|e| indexing(e.to_string()))?
            .len();
        if len > self.max_file_bytes {
            return Err(indexing(format!(
                "{len} bytes exceeds limit of {}",
                self.max_file_bytes
            )));
        }
        std::fs::read_to_string(&full).map_err(|e| indexing(e.to_string()))
    }
}

/// File text at a fixed ref of the hosted repository.
pub struct VcsContentSource<V> {
    client: V,
    git_ref: String,
}

impl<V: VcsClient> VcsContentSource<V> {
    pub fn new(client: V, git_ref: impl Into<String>) -> Self {
        Self {
            client,
            git_ref: git_ref.into(),
        }
    }
}

impl<V: VcsClient> ContentSource for VcsContentSource<V> {
    fn fetch(&self, path: &FilePath) -> Result<String> {
        self.client
            .get_file_content(path, &self.git_ref)?
            .ok_or_else(|| UnderstoryError::Indexing {
                path: path.to_string(),
                message: format!("not present at {}", self.git_ref),
            })
    }
}
