//! Embedding provider collaborator and per-shard vector indices

use crate::chunker::CodeChunk;
use crate::error::UnderstoryError;
use crate::model::{EmbeddingIndex, ShardId};
use crate::Result;

/// Turns text into fixed-width vectors.
///
/// Backends fail with `Configuration` at construction when credentials are
/// missing, and with `Embedding` when a call fails.
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;
    fn dimension(&self) -> usize;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for &T {
    fn model(&self) -> &str {
        (**self).model()
    }
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<T> {
    fn model(&self) -> &str {
        (**self).model()
    }
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Cosine similarity; 0.0 when either vector is zero or widths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Embed `chunks` (all from `shard`) in batches of `batch_size`.
pub fn build_embedding_index<E>(
    shard: &ShardId,
    chunks: &[CodeChunk],
    provider: &E,
    batch_size: usize,
) -> Result<EmbeddingIndex>
where
    E: EmbeddingProvider + ?Sized,
{
    let mut chunk_ids = Vec::with_capacity(chunks.len());
    let mut embeddings = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(CodeChunk::index_text).collect();
        let vectors = provider.embed(&texts)?;
        if vectors.len() != batch.len() {
            return Err(UnderstoryError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        chunk_ids.extend(batch.iter().map(CodeChunk::id));
        embeddings.extend(vectors);
    }

    EmbeddingIndex::new(
        shard.clone(),
        provider.model(),
        provider.dimension(),
        chunk_ids,
        embeddings,
    )
}

/// Whether a stored index can be compared against `provider`'s vectors.
pub fn is_compatible<E>(index: &EmbeddingIndex, provider: &E) -> bool
where
    E: EmbeddingProvider + ?Sized,
{
    index.model == provider.model() && index.dimension == provider.dimension()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilePath, TokenCount};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model(&self) -> &str {
            "count-v1"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn chunk(path: &str, start: usize) -> CodeChunk {
        CodeChunk {
            source: FilePath::new(path),
            symbol_name: format!("f{start}"),
            content: "body".into(),
            tokens: TokenCount::new(1),
            line_range: (start, start),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn builds_index_in_batches() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let chunks: Vec<CodeChunk> = (1..=5).map(|i| chunk("src/a.py", i)).collect();
        let shard = ShardId::new("src");

        let index = build_embedding_index(&shard, &chunks, &provider, 2).unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(index.len(), 5);
        assert_eq!(index.model, "count-v1");
        assert_eq!(index.chunk_ids[0], "src/a.py:1-1");
        assert!(is_compatible(&index, &provider));
    }
}
