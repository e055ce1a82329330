//! Local directory of JSON blobs mirroring the index branch
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! an interrupted run never leaves a half-written blob behind.

use crate::error::UnderstoryError;
use crate::model::{
    Checkpoint, CodebaseMap, CodebaseMemory, CommitSha, EmbeddingIndex, ShardId,
};
use crate::shard::{
    assemble_from_shards, decode_manifest, decode_payload, encode, split_into_shards,
    ShardSet, ShardedManifest, MANIFEST_BLOB,
};
use crate::Result;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MEMORY_LOCK: &str = ".memory.lock";

/// Exclusive or shared lock on the memory lock file, released on drop.
struct MemoryLock {
    file: File,
}

impl MemoryLock {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| UnderstoryError::Lock {
                path: path.to_path_buf(),
                message: format!("open: {e}"),
            })?;
        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        locked.map_err(|e| UnderstoryError::Lock {
            path: path.to_path_buf(),
            message: format!("acquire: {e}"),
        })?;
        Ok(Self { file })
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// True for `<16 hex>.json`, the shape of a shard blob name.
fn is_shard_blob(name: &str) -> bool {
    name.strip_suffix(".json")
        .is_some_and(|stem| stem.len() == 16 && stem.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write_blob(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.blob_path(name);
        let tmp = self.root.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    pub fn read_blob(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.blob_path(name).is_file()
    }

    pub fn delete_blob(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every `*.json` blob, sorted.
    pub fn list_json_blobs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(bytes) = self.read_blob(name)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| UnderstoryError::decode(name, e))
    }

    pub fn load_manifest(&self) -> Result<Option<ShardedManifest>> {
        match self.read_blob(MANIFEST_BLOB)? {
            Some(bytes) => decode_manifest(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Split `map`, write every shard and the manifest, then delete shard
    /// blobs the new manifest no longer references.
    ///
    /// When the map was assembled from a subset of shards, pass that subset
    /// as `loaded`: shards outside it stay in the manifest untouched.
    pub fn save_map(
        &self,
        map: &CodebaseMap,
        loaded: Option<&BTreeSet<ShardId>>,
    ) -> Result<ShardedManifest> {
        let (mut manifest, payloads) = split_into_shards(map)?;
        let previous = match self.load_manifest() {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Existing manifest unreadable; rewriting every shard");
                None
            }
        };
        if let (Some(loaded), Some(previous)) = (loaded, previous.as_ref()) {
            manifest.carry_forward(previous, loaded);
        }

        let changed = manifest.changed_since(previous.as_ref());
        for (shard, payload) in &payloads {
            let name = shard.blob_name();
            if changed.contains(shard) || !self.has_blob(&name) {
                self.write_blob(&name, &encode(payload)?)?;
            }
        }
        self.write_blob(MANIFEST_BLOB, &encode(&manifest)?)?;

        let referenced = manifest.all_blob_names();
        for name in self.list_json_blobs()? {
            if is_shard_blob(&name) && !referenced.contains(&name) {
                debug!(blob = %name, "Removing unreferenced shard blob");
                self.delete_blob(&name)?;
            }
        }

        debug!(
            shards = manifest.shards.len(),
            rewritten = changed.len(),
            cross_edges = manifest.cross_shard_edges.len(),
            "Saved codebase map"
        );
        Ok(manifest)
    }

    /// Read the manifest and the requested shards (all when `shards` is
    /// `None`). Returns `None` when there is no manifest.
    ///
    /// A shard whose blob is missing or malformed is logged and left out.
    pub fn load_map(
        &self,
        shards: Option<&BTreeSet<ShardId>>,
    ) -> Result<Option<(ShardedManifest, CodebaseMap)>> {
        let Some(manifest) = self.load_manifest()? else {
            return Ok(None);
        };

        let mut payloads = ShardSet::new();
        for (id, descriptor) in &manifest.shards {
            if shards.is_some_and(|wanted| !wanted.contains(id)) {
                continue;
            }
            let Some(bytes) = self.read_blob(&descriptor.blob_name)? else {
                warn!(shard = %id, blob = %descriptor.blob_name, "Shard blob missing; treating shard as absent");
                continue;
            };
            match decode_payload(&descriptor.blob_name, &bytes) {
                Ok(payload) => {
                    payloads.insert(id.clone(), payload);
                }
                Err(e) => {
                    warn!(shard = %id, error = %e, "Skipping malformed shard");
                }
            }
        }

        let map = assemble_from_shards(&manifest, &payloads);
        Ok(Some((manifest, map)))
    }

    /// Rebuild the map from every shard blob on disk, ignoring the manifest.
    /// Cross-shard edges are re-derived from each file's imports and the
    /// manifest is recomputed. Returns `None` when no shard blob decodes.
    pub fn load_map_from_shards(
        &self,
        indexed_at: CommitSha,
    ) -> Result<Option<(ShardedManifest, CodebaseMap)>> {
        let mut map = CodebaseMap::new(indexed_at);
        let mut recovered = 0usize;
        for name in self.list_json_blobs()? {
            if !is_shard_blob(&name) {
                continue;
            }
            let Some(bytes) = self.read_blob(&name)? else {
                continue;
            };
            match decode_payload(&name, &bytes) {
                Ok(payload) => {
                    for entry in payload.files {
                        map.upsert(entry);
                    }
                    for edge in payload.edges {
                        map.add_edge(edge);
                    }
                    recovered += 1;
                }
                Err(e) => warn!(blob = %name, error = %e, "Skipping malformed shard"),
            }
        }
        if recovered == 0 {
            return Ok(None);
        }
        let (manifest, _) = split_into_shards(&map)?;
        debug!(shards = recovered, files = map.len(), "Recovered map from shard blobs");
        Ok(Some((manifest, map)))
    }

    /// Shards actually present on disk, out of those the manifest lists.
    pub fn local_shards(&self, manifest: &ShardedManifest) -> BTreeSet<ShardId> {
        manifest
            .shards
            .values()
            .filter(|d| self.has_blob(&d.blob_name))
            .map(|d| d.shard_id.clone())
            .collect()
    }

    pub fn save_embeddings(&self, index: &EmbeddingIndex) -> Result<()> {
        index.validate()?;
        let name = EmbeddingIndex::blob_name(&index.shard_id, &index.model);
        self.write_blob(&name, &encode(index)?)
    }

    /// Index for `shard` under `model`, or `None` if absent or stored under
    /// a different model.
    pub fn load_embeddings(&self, shard: &ShardId, model: &str) -> Result<Option<EmbeddingIndex>> {
        let name = EmbeddingIndex::blob_name(shard, model);
        let Some(index) = self.read_json::<EmbeddingIndex>(&name)? else {
            return Ok(None);
        };
        if index.model != model || index.shard_id != *shard {
            warn!(blob = %name, stored_model = %index.model, "Embedding blob does not match its name; ignoring");
            return Ok(None);
        }
        index
            .validate()
            .map_err(|e| UnderstoryError::decode(&name, e))?;
        Ok(Some(index))
    }

    pub fn save_memory(&self, memory: &CodebaseMemory) -> Result<()> {
        let _lock = MemoryLock::acquire(&self.root.join(MEMORY_LOCK), true)?;
        let name = CodebaseMemory::blob_name(&memory.repo_id);
        self.write_blob(&name, &encode(memory)?)
    }

    pub fn load_memory(&self, repo_id: &str) -> Result<Option<CodebaseMemory>> {
        let _lock = MemoryLock::acquire(&self.root.join(MEMORY_LOCK), false)?;
        self.read_json(&CodebaseMemory::blob_name(repo_id))
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write_blob(Checkpoint::BLOB_NAME, &encode(checkpoint)?)
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.read_json(Checkpoint::BLOB_NAME)
    }

    /// Remove every blob (fresh start after an unusable remote state).
    pub fn clear(&self) -> Result<()> {
        for name in self.list_json_blobs()? {
            self.delete_blob(&name)?;
        }
        Ok(())
    }
}
