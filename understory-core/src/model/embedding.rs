//! Precomputed chunk vectors for one shard under one embedding model

use super::ids::stable_hash;
use super::ShardId;
use crate::error::UnderstoryError;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    pub shard_id: ShardId,
    pub model: String,
    pub dimension: usize,
    /// Parallel to `embeddings`.
    pub chunk_ids: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Fails when ids and vectors are not parallel or a vector has the
    /// wrong width.
    pub fn new(
        shard_id: ShardId,
        model: impl Into<String>,
        dimension: usize,
        chunk_ids: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let index = Self {
            shard_id,
            model: model.into(),
            dimension,
            chunk_ids,
            embeddings,
        };
        index.validate()?;
        Ok(index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_ids.len() != self.embeddings.len() {
            return Err(UnderstoryError::Validation(format!(
                "embedding index for {} has {} ids but {} vectors",
                self.shard_id,
                self.chunk_ids.len(),
                self.embeddings.len()
            )));
        }
        if let Some(bad) = self.embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(UnderstoryError::Validation(format!(
                "embedding index for {} expects dimension {}, found vector of {}",
                self.shard_id,
                self.dimension,
                bad.len()
            )));
        }
        Ok(())
    }

    /// Blob name encoding both shard and model, so switching models never
    /// overwrites an existing index.
    pub fn blob_name(shard_id: &ShardId, model: &str) -> String {
        format!(
            "{}_{}_embeddings.json",
            shard_id.blob_hash(),
            stable_hash(model)
        )
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.chunk_ids
            .iter()
            .map(String::as_str)
            .zip(self.embeddings.iter().map(Vec::as_slice))
    }
}
