//! Directory-scoped shards of the codebase map

pub mod codec;
pub mod manifest;

pub use codec::{
    assemble_from_shards, decode_manifest, decode_payload, encode, split_into_shards,
    ShardPayload, ShardSet,
};
pub use manifest::{CrossShardEdge, ShardDescriptor, ShardedManifest, MANIFEST_BLOB};

use crate::model::{FilePath, ShardId};
use std::collections::BTreeSet;

/// Shards whose contents must be recomputed because one of `paths` changed.
/// Unlike `ShardedManifest::shards_for_files` this includes shards that do
/// not exist yet.
pub fn dirty_shards<'a, I>(paths: I) -> BTreeSet<ShardId>
where
    I: IntoIterator<Item = &'a FilePath>,
{
    paths.into_iter().map(FilePath::shard_id).collect()
}
