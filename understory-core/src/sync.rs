//! Moves blobs between the local store and the index branch
//!
//! The remote tree listing is fetched once per instance and reused by every
//! pull; only a successful push invalidates it. The branch has a single
//! writer per run: a concurrent push shows up as a failed ref update.

use crate::error::UnderstoryError;
use crate::model::{Checkpoint, CommitSha, ShardId};
use crate::shard::{decode_manifest, MANIFEST_BLOB};
use crate::store::LocalStore;
use crate::vcs::{NewTreeEntry, TreeEntry, VcsClient};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn, Span};

#[derive(Debug, Clone, Default)]
struct CachedTree {
    head: Option<CommitSha>,
    /// Top-level blobs by name.
    blobs: BTreeMap<String, TreeEntry>,
}

pub struct BranchSync<V> {
    client: V,
    store: LocalStore,
    branch: String,
    tree: Option<CachedTree>,
    span: Span,
}

impl<V: VcsClient> BranchSync<V> {
    pub fn new(client: V, store: LocalStore, branch: impl Into<String>, span: Span) -> Self {
        Self {
            client,
            store,
            branch: branch.into(),
            tree: None,
            span,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn client(&self) -> &V {
        &self.client
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Tip of the branch as of the cached listing.
    pub fn remote_head(&mut self) -> Result<Option<CommitSha>> {
        self.ensure_tree()?;
        Ok(self.cached_tree()?.head.clone())
    }

    fn ensure_tree(&mut self) -> Result<()> {
        if self.tree.is_none() {
            self.tree = Some(self.fetch_tree()?);
        }
        Ok(())
    }

    fn cached_tree(&self) -> Result<&CachedTree> {
        self.tree
            .as_ref()
            .ok_or_else(|| UnderstoryError::publish("tree", "tree listing not fetched"))
    }

    fn fetch_tree(&self) -> Result<CachedTree> {
        let Some(head) = self.client.get_ref_sha(&self.branch)? else {
            debug!(parent: &self.span, branch = %self.branch, "Index branch does not exist yet");
            return Ok(CachedTree::default());
        };
        let tree_sha = self.client.get_commit_tree_sha(&head)?;
        let blobs = self
            .client
            .get_tree_entries_flat(&tree_sha)?
            .into_iter()
            .filter(|e| e.is_blob() && !e.path.contains('/'))
            .map(|e| (e.path.clone(), e))
            .collect::<BTreeMap<_, _>>();
        debug!(parent: &self.span, head = %head.short(), blobs = blobs.len(), "Fetched index tree");
        Ok(CachedTree {
            head: Some(head),
            blobs,
        })
    }

    fn download(&self, entry: &TreeEntry) -> Result<()> {
        let bytes = self.client.get_blob_content(&entry.sha)?;
        self.store.write_blob(&entry.path, &bytes)
    }

    /// Fetch `manifest.json` only. Returns false when the branch or the
    /// manifest does not exist.
    pub fn pull_manifest(&mut self) -> Result<bool> {
        self.ensure_tree()?;
        let Some(entry) = self.cached_tree()?.blobs.get(MANIFEST_BLOB).cloned() else {
            return Ok(false);
        };
        let bytes = self.client.get_blob_content(&entry.sha)?;
        decode_manifest(&bytes)?;
        self.store.write_blob(MANIFEST_BLOB, &bytes)?;
        info!(parent: &self.span, branch = %self.branch, "Pulled manifest");
        Ok(true)
    }

    /// Download exactly the named blobs that exist remotely.
    pub fn pull_blobs<'a, I>(&mut self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: BTreeSet<&str> = names.into_iter().collect();
        self.ensure_tree()?;
        let entries: Vec<TreeEntry> = {
            let tree = self.cached_tree()?;
            wanted
                .iter()
                .filter_map(|name| {
                    let entry = tree.blobs.get(*name);
                    if entry.is_none() {
                        debug!(parent: &self.span, blob = %name, "Requested blob not on branch");
                    }
                    entry.cloned()
                })
                .collect()
        };
        for entry in &entries {
            self.download(entry)?;
        }
        info!(parent: &self.span, requested = wanted.len(), downloaded = entries.len(), "Pulled blobs");
        Ok(entries.len())
    }

    /// Pull the manifest plus the shards covering `shards`.
    pub fn pull_shards(&mut self, shards: &BTreeSet<ShardId>) -> Result<usize> {
        let manifest = self
            .store
            .load_manifest()?
            .ok_or_else(|| UnderstoryError::publish("pull", "no manifest to resolve shard blobs"))?;
        let names = manifest.blob_names(shards);
        self.pull_blobs(names.iter().map(String::as_str))
    }

    /// Download every JSON blob on the branch.
    pub fn pull_all(&mut self) -> Result<usize> {
        self.ensure_tree()?;
        let entries: Vec<TreeEntry> = self
            .cached_tree()?
            .blobs
            .values()
            .filter(|e| e.path.ends_with(".json"))
            .cloned()
            .collect();
        for entry in &entries {
            self.download(entry)?;
        }
        info!(parent: &self.span, downloaded = entries.len(), "Pulled full index");
        Ok(entries.len())
    }

    /// Publish every local blob as one new commit on the branch.
    ///
    /// The tree is a full replacement. Remote blobs that were never pulled
    /// but are still referenced (shards listed in the local manifest, their
    /// embeddings, memory, checkpoint) are carried over by sha so a
    /// selective pull followed by a push loses nothing. Returns the new
    /// commit, or `None` when there was nothing to push.
    pub fn push(&mut self, message: &str) -> Result<Option<CommitSha>> {
        let local = self.store.list_json_blobs()?;
        if local.is_empty() {
            warn!(parent: &self.span, "Nothing to push; local store is empty");
            return Ok(None);
        }

        let referenced = self.referenced_remote_blobs();
        self.ensure_tree()?;
        let (head, carried): (Option<CommitSha>, Vec<NewTreeEntry>) = {
            let tree = self.cached_tree()?;
            let local_set: BTreeSet<&str> = local.iter().map(String::as_str).collect();
            let carried = tree
                .blobs
                .values()
                .filter(|e| !local_set.contains(e.path.as_str()) && referenced(e.path.as_str()))
                .map(|e| NewTreeEntry::blob(e.path.clone(), e.sha.clone()))
                .collect();
            (tree.head.clone(), carried)
        };

        let mut entries = Vec::with_capacity(local.len() + carried.len());
        for name in &local {
            let Some(bytes) = self.store.read_blob(name)? else {
                continue;
            };
            let sha = self.client.create_blob(&bytes)?;
            entries.push(NewTreeEntry::blob(name.clone(), sha));
        }
        let carried_count = carried.len();
        entries.extend(carried);

        let tree_sha = self.client.create_tree(&entries)?;
        let parents: Vec<CommitSha> = head.iter().cloned().collect();
        let commit = self.client.create_commit(message, &tree_sha, &parents)?;
        match head {
            Some(_) => self.client.update_ref(&self.branch, &commit)?,
            None => self.client.create_ref(&self.branch, &commit)?,
        }
        self.tree = None;

        info!(
            parent: &self.span,
            branch = %self.branch,
            commit = %commit.short(),
            uploaded = local.len(),
            carried = carried_count,
            "Pushed index"
        );
        Ok(Some(commit))
    }

    /// Predicate over remote blob names worth keeping when absent locally.
    fn referenced_remote_blobs(&self) -> impl Fn(&str) -> bool {
        let manifest = match self.store.load_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Local manifest unreadable; not carrying remote shards");
                None
            }
        };
        let (shard_blobs, shard_hashes): (BTreeSet<String>, BTreeSet<String>) = match manifest {
            Some(m) => (
                m.all_blob_names(),
                m.shards.keys().map(ShardId::blob_hash).collect(),
            ),
            None => Default::default(),
        };
        move |name: &str| {
            if name == Checkpoint::BLOB_NAME || name.ends_with("_memory.json") {
                return true;
            }
            if shard_blobs.contains(name) {
                return true;
            }
            name.ends_with("_embeddings.json")
                && name
                    .split_once('_')
                    .is_some_and(|(hash, _)| shard_hashes.contains(hash))
        }
    }
}
