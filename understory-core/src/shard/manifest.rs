//! Manifest: which shards exist and which edges cross between them

use crate::model::{CommitSha, Edge, FilePath, ShardId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

pub const MANIFEST_BLOB: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub shard_id: ShardId,
    pub blob_name: String,
    pub file_count: usize,
    /// Hash of the encoded payload; unchanged shards keep the same value.
    pub content_hash: String,
    #[serde(default)]
    pub files: Vec<FilePath>,
}

/// An edge whose endpoints live in different shards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossShardEdge {
    pub source_shard: ShardId,
    pub target_shard: ShardId,
    pub edge: Edge,
}

impl CrossShardEdge {
    pub fn new(edge: Edge) -> Self {
        Self {
            source_shard: edge.source.shard_id(),
            target_shard: edge.target.shard_id(),
            edge,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardedManifest {
    #[serde(default)]
    pub indexed_at: CommitSha,
    pub shards: BTreeMap<ShardId, ShardDescriptor>,
    pub cross_shard_edges: BTreeSet<CrossShardEdge>,
}

impl ShardedManifest {
    pub fn descriptor(&self, shard: &ShardId) -> Option<&ShardDescriptor> {
        self.shards.get(shard)
    }

    pub fn shard_ids(&self) -> BTreeSet<ShardId> {
        self.shards.keys().cloned().collect()
    }

    /// Known shards directly containing any of `paths`.
    pub fn shards_for_files<'a, I>(&self, paths: I) -> BTreeSet<ShardId>
    where
        I: IntoIterator<Item = &'a FilePath>,
    {
        paths
            .into_iter()
            .map(FilePath::shard_id)
            .filter(|shard| self.shards.contains_key(shard))
            .collect()
    }

    /// Shards reachable from `seeds` through at most `hops` cross-shard
    /// edges, excluding the seeds themselves.
    ///
    /// Edges are followed in both directions: a shard importing a seed is as
    /// relevant as one the seed imports. Cycles are handled by the visited
    /// set.
    pub fn adjacent_shards(&self, seeds: &BTreeSet<ShardId>, hops: usize) -> BTreeSet<ShardId> {
        let mut neighbours: HashMap<&ShardId, BTreeSet<&ShardId>> = HashMap::new();
        for cross in &self.cross_shard_edges {
            neighbours
                .entry(&cross.source_shard)
                .or_default()
                .insert(&cross.target_shard);
            neighbours
                .entry(&cross.target_shard)
                .or_default()
                .insert(&cross.source_shard);
        }

        let mut visited: BTreeSet<&ShardId> = seeds.iter().collect();
        let mut queue: VecDeque<(&ShardId, usize)> = seeds.iter().map(|s| (s, 0)).collect();
        let mut found = BTreeSet::new();

        while let Some((shard, depth)) = queue.pop_front() {
            if depth >= hops {
                continue;
            }
            let Some(next) = neighbours.get(shard) else {
                continue;
            };
            for &neighbour in next {
                if visited.insert(neighbour) {
                    found.insert(neighbour.clone());
                    queue.push_back((neighbour, depth + 1));
                }
            }
        }
        found
    }

    /// Shards needed to answer a query about `paths`.
    pub fn blast_radius<'a, I>(&self, paths: I, hops: usize) -> BTreeSet<ShardId>
    where
        I: IntoIterator<Item = &'a FilePath>,
    {
        let direct = self.shards_for_files(paths);
        let adjacent = self.adjacent_shards(&direct, hops);
        direct.into_iter().chain(adjacent).collect()
    }

    /// Blob names of the given shards, skipping unknown ids.
    pub fn blob_names<'a, I>(&self, shards: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a ShardId>,
    {
        shards
            .into_iter()
            .filter_map(|shard| self.shards.get(shard))
            .map(|d| d.blob_name.clone())
            .collect()
    }

    pub fn all_blob_names(&self) -> BTreeSet<String> {
        self.shards.values().map(|d| d.blob_name.clone()).collect()
    }

    /// Shards whose content differs from `previous` (new or rewritten).
    pub fn changed_since(&self, previous: Option<&ShardedManifest>) -> BTreeSet<ShardId> {
        self.shards
            .iter()
            .filter(|(id, descriptor)| {
                previous
                    .and_then(|p| p.shards.get(*id))
                    .map_or(true, |old| old.content_hash != descriptor.content_hash)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Re-attach descriptors for shards that were never loaded into the map
    /// this manifest was split from. A shard absent from a partial load is
    /// not a deleted shard.
    pub fn carry_forward(&mut self, previous: &ShardedManifest, loaded: &BTreeSet<ShardId>) {
        for (id, descriptor) in &previous.shards {
            if !loaded.contains(id) && !self.shards.contains_key(id) {
                self.shards.insert(id.clone(), descriptor.clone());
            }
        }
    }
}
