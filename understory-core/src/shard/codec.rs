//! Lossless split of a codebase map into shard payloads, and reassembly
//!
//! Encoding is deterministic: files and edges are sorted, maps are ordered,
//! so an unchanged shard always encodes to the same bytes.

use super::manifest::{CrossShardEdge, ShardDescriptor, ShardedManifest, MANIFEST_BLOB};
use crate::error::UnderstoryError;
use crate::model::ids::stable_hash;
use crate::model::{CodebaseMap, Edge, FileEntry, ShardId};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One shard's file entries and the edges that stay inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPayload {
    pub shard_id: ShardId,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl ShardPayload {
    fn empty(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            files: Vec::new(),
            edges: Vec::new(),
        }
    }
}

pub type ShardSet = BTreeMap<ShardId, ShardPayload>;

/// Group files by parent directory; edges whose endpoints share a shard go
/// into that shard's payload, all others into the manifest.
pub fn split_into_shards(map: &CodebaseMap) -> Result<(ShardedManifest, ShardSet)> {
    let mut payloads: ShardSet = BTreeMap::new();

    for path in map.files() {
        let Some(entry) = map.get(path) else { continue };
        let shard = path.shard_id();
        payloads
            .entry(shard.clone())
            .or_insert_with(|| ShardPayload::empty(shard))
            .files
            .push(entry.clone());
    }

    let mut manifest = ShardedManifest {
        indexed_at: map.indexed_at().clone(),
        ..ShardedManifest::default()
    };

    for edge in map.graph().edges() {
        let source = edge.source.shard_id();
        if source == edge.target.shard_id() {
            payloads
                .entry(source.clone())
                .or_insert_with(|| ShardPayload::empty(source))
                .edges
                .push(edge.clone());
        } else {
            manifest
                .cross_shard_edges
                .insert(CrossShardEdge::new(edge.clone()));
        }
    }

    for (shard, payload) in payloads.iter_mut() {
        payload.edges.sort();
        let bytes = encode(payload)?;
        manifest.shards.insert(
            shard.clone(),
            ShardDescriptor {
                shard_id: shard.clone(),
                blob_name: shard.blob_name(),
                file_count: payload.files.len(),
                content_hash: content_hash(&bytes),
                files: payload.files.iter().map(|f| f.path.clone()).collect(),
            },
        );
    }

    Ok((manifest, payloads))
}

/// Rebuild a map from any subset of shards.
///
/// Every cross-shard edge in the manifest is restored, including those whose
/// endpoints live in shards that were not provided.
pub fn assemble_from_shards(manifest: &ShardedManifest, payloads: &ShardSet) -> CodebaseMap {
    let mut map = CodebaseMap::new(manifest.indexed_at.clone());
    for payload in payloads.values() {
        for entry in &payload.files {
            map.insert_stored(entry.clone());
        }
        for edge in &payload.edges {
            map.add_edge(edge.clone());
        }
    }
    for cross in &manifest.cross_shard_edges {
        map.add_edge(cross.edge.clone());
    }
    map
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

pub fn content_hash(bytes: &[u8]) -> String {
    stable_hash(&String::from_utf8_lossy(bytes))
}

fn decode<T: DeserializeOwned>(blob: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| UnderstoryError::decode(blob, e))
}

/// Decode a shard blob. A payload holding files from another directory is
/// rejected as a whole.
pub fn decode_payload(blob: &str, bytes: &[u8]) -> Result<ShardPayload> {
    let payload: ShardPayload = decode(blob, bytes)?;
    if let Some(stray) = payload
        .files
        .iter()
        .find(|f| f.path.shard_id() != payload.shard_id)
    {
        return Err(UnderstoryError::decode(
            blob,
            format!("{} does not belong to shard {}", stray.path, payload.shard_id),
        ));
    }
    Ok(payload)
}

pub fn decode_manifest(bytes: &[u8]) -> Result<ShardedManifest> {
    decode(MANIFEST_BLOB, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitSha, FilePath, Symbol, SymbolKind};
    use std::collections::BTreeSet;

    fn sample_map() -> CodebaseMap {
        let mut map = CodebaseMap::new(CommitSha::new("c0ffee"));
        map.upsert(
            FileEntry::new("src/auth/login.py")
                .with_symbols(vec![Symbol::new("login", SymbolKind::Function, (1, 5))])
                .with_imports(["src/db/models.py", "src/auth/tokens.py"]),
        );
        map.upsert(FileEntry::new("src/auth/tokens.py"));
        map.upsert(
            FileEntry::new("src/db/models.py")
                .with_symbols(vec![Symbol::new("User", SymbolKind::Class, (1, 30))]),
        );
        map.upsert(FileEntry::new("setup.py").with_imports(["src/auth/login.py"]));
        map
    }

    #[test]
    fn edges_are_classified_by_shard() {
        let (manifest, payloads) = split_into_shards(&sample_map()).unwrap();
        let ids: Vec<&str> = manifest.shards.keys().map(ShardId::as_str).collect();
        assert_eq!(ids, vec![".", "src/auth", "src/db"]);

        let auth = &payloads[&ShardId::new("src/auth")];
        assert_eq!(auth.files.len(), 2);
        assert_eq!(auth.edges, vec![Edge::imports("src/auth/login.py", "src/auth/tokens.py")]);
        assert_eq!(manifest.cross_shard_edges.len(), 2);
        assert_eq!(manifest.indexed_at.as_str(), "c0ffee");
    }

    #[test]
    fn full_reassembly_preserves_files_and_edges() {
        let original = sample_map();
        let (manifest, payloads) = split_into_shards(&original).unwrap();
        let rebuilt = assemble_from_shards(&manifest, &payloads);

        assert_eq!(rebuilt.files(), original.files());
        for path in original.files() {
            assert_eq!(rebuilt.get(path), original.get(path));
        }
        let a: BTreeSet<&Edge> = original.graph().edges().collect();
        let b: BTreeSet<&Edge> = rebuilt.graph().edges().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn partial_load_keeps_cross_shard_edges() {
        let (manifest, mut payloads) = split_into_shards(&sample_map()).unwrap();
        payloads.retain(|id, _| id.as_str() == "src/auth");
        let partial = assemble_from_shards(&manifest, &payloads);

        let models = FilePath::new("src/db/models.py");
        assert!(partial.get(&models).is_none());
        assert_eq!(
            partial.graph().dependents_of(&models),
            vec![&FilePath::new("src/auth/login.py")]
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let (m1, p1) = split_into_shards(&sample_map()).unwrap();
        let (m2, p2) = split_into_shards(&sample_map()).unwrap();
        assert_eq!(encode(&m1).unwrap(), encode(&m2).unwrap());
        for (id, payload) in &p1 {
            assert_eq!(encode(payload).unwrap(), encode(&p2[id]).unwrap());
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode_payload("abc.json", br#"{"shard_id":"src"}"#).unwrap_err();
        assert!(matches!(err, UnderstoryError::Decode { .. }));

        let stray = br#"{"shard_id":"src","files":[{"path":"lib/x.py"}],"edges":[]}"#;
        assert!(decode_payload("abc.json", stray).is_err());
    }
}
