//! Unified diff parsing: which files and which symbols a change touches

use crate::model::{CodebaseMap, FilePath};
use std::collections::BTreeSet;

/// One `@@ -a,b +c,d @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

impl Hunk {
    /// Lines touched on the new side, 1-indexed and inclusive. A pure
    /// deletion still marks the line it was removed before.
    pub fn new_range(&self) -> (usize, usize) {
        let start = self.new_start.max(1);
        (start, start + self.new_len.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: FilePath,
    pub hunks: Vec<Hunk>,
    pub deleted: bool,
}

/// Split a unified diff (as served by the PR diff endpoint) into per-file
/// hunk lists.
pub fn parse_unified_diff(text: &str) -> Vec<FileDiff> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut old_path: Option<String> = None;
    // Body lines still expected for the current hunk (old side, new side)
    let mut pending = (0usize, 0usize);

    for line in text.lines() {
        if (pending.0 > 0 || pending.1 > 0) && !line.starts_with("diff --git ") {
            match line.as_bytes().first() {
                Some(b'-') => pending.0 = pending.0.saturating_sub(1),
                Some(b'+') => pending.1 = pending.1.saturating_sub(1),
                Some(b'\\') => {}
                _ => {
                    pending.0 = pending.0.saturating_sub(1);
                    pending.1 = pending.1.saturating_sub(1);
                }
            }
            continue;
        }
        if line.starts_with("diff --git ") {
            old_path = None;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            old_path = strip_side(rest, "a/");
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let (path, deleted) = match strip_side(rest, "b/") {
                Some(p) => (p, false),
                None => match old_path.take() {
                    Some(p) => (p, true),
                    None => continue,
                },
            };
            files.push(FileDiff {
                path: FilePath::new(path),
                hunks: Vec::new(),
                deleted,
            });
        } else if line.starts_with("@@") {
            if let (Some(file), Some(hunk)) = (files.last_mut(), parse_hunk_header(line)) {
                pending = (hunk.old_len, hunk.new_len);
                file.hunks.push(hunk);
            }
        }
    }
    files
}

fn strip_side(rest: &str, prefix: &str) -> Option<String> {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let mut parts = line.split_whitespace().skip(1);
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    let (old_start, old_len) = parse_range(old)?;
    let (new_start, new_len) = parse_range(new)?;
    Some(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
    })
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

/// Names of symbols in `map` whose line ranges overlap a hunk. Files the
/// map doesn't hold contribute nothing.
pub fn changed_symbols(map: &CodebaseMap, diffs: &[FileDiff]) -> Vec<String> {
    let mut names = BTreeSet::new();
    for diff in diffs.iter().filter(|d| !d.deleted) {
        let Some(entry) = map.get(&diff.path) else {
            continue;
        };
        for hunk in &diff.hunks {
            let (start, end) = hunk.new_range();
            for symbol in entry.symbols.iter().filter(|s| s.overlaps(start, end)) {
                names.insert(symbol.name.clone());
            }
        }
    }
    names.into_iter().collect()
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
