//! Indexing service: fetch, parse and upsert into a codebase map
//!
//! Small batches run sequentially. Larger ones fan fetch+parse out over
//! rayon workers that feed a bounded channel; the calling thread owns the
//! map and applies results as they arrive.

use crate::content::ContentSource;
use crate::model::{CodebaseMap, CommitSha, FileEntry, FilePath, ShardId};
use crate::parse::Parser;
use crate::shard::dirty_shards;
use crate::tokens::warm_bpe;
use crate::Result;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn, Span};

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Files that are new or whose structure changed.
    pub changed: BTreeSet<FilePath>,
    /// Files re-parsed with no structural difference.
    pub unchanged: usize,
    /// Files dropped from the map.
    pub removed: BTreeSet<FilePath>,
    /// Files skipped because fetching or parsing failed.
    pub failed: Vec<(FilePath, String)>,
}

impl IndexReport {
    /// Shards that must be re-encoded after this run.
    pub fn dirty_shards(&self) -> BTreeSet<ShardId> {
        dirty_shards(self.changed.iter().chain(self.removed.iter()))
    }

    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

pub struct IndexingService {
    commit: CommitSha,
    span: Span,
}

type Parsed = (FilePath, std::result::Result<FileEntry, String>);

impl IndexingService {
    /// Batches of this size or less skip the worker pool
    pub(crate) const SEQUENTIAL_THRESHOLD: usize = 32;
    const CHANNEL_CAPACITY: usize = 64;

    /// Entries produced by this service are stamped with `commit`.
    pub fn new(commit: CommitSha, span: Span) -> Self {
        Self { commit, span }
    }

    /// Fetch, parse and upsert each path. A file that fails to fetch or
    /// parse is logged and skipped.
    pub fn index<C, P>(
        &self,
        map: &mut CodebaseMap,
        paths: &[FilePath],
        content: &C,
        parser: &P,
    ) -> IndexReport
    where
        C: ContentSource + ?Sized,
        P: Parser + ?Sized,
    {
        let mut report = IndexReport::default();
        if paths.len() <= Self::SEQUENTIAL_THRESHOLD {
            for path in paths {
                let parsed = parse_one(path, content, parser);
                self.apply(map, parsed, &mut report);
            }
        } else {
            self.index_parallel(map, paths, content, parser, &mut report);
        }

        map.set_indexed_at(self.commit.clone());
        info!(
            parent: &self.span,
            requested = paths.len(),
            changed = report.changed.len(),
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "Indexed files"
        );
        report
    }

    /// Drop deleted files, then index the rest.
    pub fn apply_changes<C, P>(
        &self,
        map: &mut CodebaseMap,
        changed: &[FilePath],
        removed: &[FilePath],
        content: &C,
        parser: &P,
    ) -> IndexReport
    where
        C: ContentSource + ?Sized,
        P: Parser + ?Sized,
    {
        let mut dropped = BTreeSet::new();
        for path in removed {
            if map.remove(path).is_some() {
                debug!(parent: &self.span, path = %path, "Removed file from map");
                dropped.insert(path.clone());
            }
        }
        let mut report = self.index(map, changed, content, parser);
        report.removed = dropped;
        report
    }

    fn index_parallel<C, P>(
        &self,
        map: &mut CodebaseMap,
        paths: &[FilePath],
        content: &C,
        parser: &P,
        report: &mut IndexReport,
    ) where
        C: ContentSource + ?Sized,
        P: Parser + ?Sized,
    {
        // Build the BPE tables before workers contend for them
        warm_bpe();

        let (tx, rx) = crossbeam_channel::bounded::<Parsed>(Self::CHANNEL_CAPACITY);
        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;

        std::thread::scope(|s| {
            let producer = tx.clone();
            s.spawn(move || {
                paths.par_iter().for_each_with(producer, |sender, path| {
                    if cancelled_ref.load(Ordering::Relaxed) {
                        return;
                    }
                    if sender.send(parse_one(path, content, parser)).is_err() {
                        cancelled_ref.store(true, Ordering::Relaxed);
                    }
                });
            });
            drop(tx);

            for parsed in rx.iter() {
                self.apply(map, parsed, report);
            }
        });
    }

    fn apply(&self, map: &mut CodebaseMap, (path, parsed): Parsed, report: &mut IndexReport) {
        match parsed {
            Ok(entry) => {
                if map.upsert(entry.indexed_at(self.commit.clone())) {
                    report.changed.insert(path);
                } else {
                    report.unchanged += 1;
                }
            }
            Err(message) => {
                warn!(parent: &self.span, path = %path, error = %message, "Skipping file");
                report.failed.push((path, message));
            }
        }
    }
}

fn parse_one<C, P>(path: &FilePath, content: &C, parser: &P) -> Parsed
where
    C: ContentSource + ?Sized,
    P: Parser + ?Sized,
{
    let result: Result<FileEntry> = content
        .fetch(path)
        .and_then(|text| parser.parse(path, &text));
    (path.clone(), result.map_err(|e| e.to_string()))
}
