//! Branch synchronization against an in-memory hosted repository.

mod common;

use common::FakeVcs;
use std::collections::BTreeSet;
use tempfile::TempDir;
use tracing::Span;
use understory_core::shard::MANIFEST_BLOB;
use understory_core::{
    BranchSync, Checkpoint, CodebaseMap, CommitSha, FileEntry, FilePath, LocalStore, ShardId,
};

const BRANCH: &str = "understory-index";

fn sample_map() -> CodebaseMap {
    let mut map = CodebaseMap::new(CommitSha::new("c1"));
    map.upsert(FileEntry::new("src/auth/login.py").with_imports(["src/db/models.py"]));
    map.upsert(FileEntry::new("src/db/models.py"));
    map.upsert(FileEntry::new("src/api/routes.py"));
    map.upsert(FileEntry::new("docs/conf.py"));
    map
}

/// Publish `sample_map` from a throwaway store.
fn publish(vcs: &FakeVcs) {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();
    store.save_map(&sample_map(), None).unwrap();
    store
        .save_checkpoint(&Checkpoint::new(CommitSha::new("c1"), 4))
        .unwrap();
    let mut sync = BranchSync::new(vcs, store, BRANCH, Span::none());
    assert!(sync.push("initial index").unwrap().is_some());
}

#[test]
fn push_event_pulls_only_the_blast_radius() {
    let vcs = FakeVcs::new();
    publish(&vcs);
    vcs.reset_log();

    let dir = TempDir::new().unwrap();
    let mut sync = BranchSync::new(&vcs, LocalStore::open(dir.path()).unwrap(), BRANCH, Span::none());
    assert!(sync.pull_manifest().unwrap());
    let manifest = sync.store().load_manifest().unwrap().unwrap();

    let changed = [FilePath::new("src/auth/login.py")];
    let direct = manifest.shards_for_files(&changed);
    assert_eq!(direct, BTreeSet::from([ShardId::new("src/auth")]));
    let adjacent = manifest.adjacent_shards(&direct, 1);
    assert_eq!(adjacent, BTreeSet::from([ShardId::new("src/db")]));

    let radius = manifest.blast_radius(&changed, 1);
    assert_eq!(sync.pull_shards(&radius).unwrap(), 2);

    let expected: BTreeSet<String> = [
        MANIFEST_BLOB.to_string(),
        ShardId::new("src/auth").blob_name(),
        ShardId::new("src/db").blob_name(),
    ]
    .into_iter()
    .collect();
    assert_eq!(vcs.fetched_names(BRANCH), expected);

    let (_, map) = sync.store().load_map(Some(&radius)).unwrap().unwrap();
    assert_eq!(map.len(), 2);
    assert!(map.contains(&FilePath::new("src/db/models.py")));
}

#[test]
fn tree_listing_is_cached_until_push() {
    let vcs = FakeVcs::new();
    publish(&vcs);
    vcs.reset_log();

    let dir = TempDir::new().unwrap();
    let mut sync = BranchSync::new(&vcs, LocalStore::open(dir.path()).unwrap(), BRANCH, Span::none());
    // No pull_manifest first: the listing is fetched on demand
    assert_eq!(sync.pull_blobs([Checkpoint::BLOB_NAME]).unwrap(), 1);
    assert!(sync.pull_manifest().unwrap());
    sync.pull_all().unwrap();
    assert_eq!(vcs.tree_listings(), 1);

    sync.push("republish").unwrap();
    sync.pull_all().unwrap();
    assert_eq!(vcs.tree_listings(), 2);
}

#[test]
fn partial_pull_then_push_keeps_unpulled_shards() {
    let vcs = FakeVcs::new();
    publish(&vcs);
    let before = vcs.branch_blobs(BRANCH);

    let dir = TempDir::new().unwrap();
    let mut sync = BranchSync::new(&vcs, LocalStore::open(dir.path()).unwrap(), BRANCH, Span::none());
    sync.pull_manifest().unwrap();
    let auth = BTreeSet::from([ShardId::new("src/auth")]);
    sync.pull_shards(&auth).unwrap();

    let (_, mut map) = sync.store().load_map(Some(&auth)).unwrap().unwrap();
    map.upsert(FileEntry::new("src/auth/tokens.py"));
    let manifest = sync.store().save_map(&map, Some(&auth)).unwrap();
    assert_eq!(manifest.shards.len(), 4);

    sync.push("add tokens").unwrap();
    let after = vcs.branch_blobs(BRANCH);
    assert_eq!(before, after);

    // Fresh clone sees every file, including the new one
    let fresh = TempDir::new().unwrap();
    let mut reader =
        BranchSync::new(&vcs, LocalStore::open(fresh.path()).unwrap(), BRANCH, Span::none());
    reader.pull_all().unwrap();
    let (_, full) = reader.store().load_map(None).unwrap().unwrap();
    assert_eq!(full.len(), 5);
    assert!(full.contains(&FilePath::new("src/api/routes.py")));
}

#[test]
fn missing_branch_pulls_nothing() {
    let vcs = FakeVcs::new();
    let dir = TempDir::new().unwrap();
    let mut sync = BranchSync::new(&vcs, LocalStore::open(dir.path()).unwrap(), BRANCH, Span::none());

    assert!(!sync.pull_manifest().unwrap());
    assert_eq!(sync.pull_all().unwrap(), 0);
    assert_eq!(sync.remote_head().unwrap(), None);
    // Nothing local either
    assert_eq!(sync.push("empty").unwrap(), None);
    assert!(vcs.branch_blobs(BRANCH).is_empty());
}

#[test]
fn first_push_creates_the_branch() {
    let vcs = FakeVcs::new();
    publish(&vcs);
    let blobs = vcs.branch_blobs(BRANCH);
    assert!(blobs.contains(MANIFEST_BLOB));
    assert!(blobs.contains(Checkpoint::BLOB_NAME));
    assert!(blobs.contains(&ShardId::new("docs").blob_name()));

    let bytes = vcs.branch_blob(BRANCH, Checkpoint::BLOB_NAME).unwrap();
    let checkpoint: Checkpoint = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(checkpoint.commit, CommitSha::new("c1"));
}
