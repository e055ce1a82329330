//! Embedding similarity between the query and precomputed chunk vectors

use super::{fill_budget, rank, ContextItem, RetrievalContext, RetrievalQuery, RetrievalStrategy};
use crate::chunker::CodeChunk;
use crate::embedding::{cosine_similarity, is_compatible, EmbeddingProvider};
use crate::error::UnderstoryError;
use crate::model::TokenCount;
use crate::Result;
use std::collections::HashMap;
use tracing::debug;

const NAME: &str = "semantic";

pub struct SemanticStrategy<E> {
    provider: E,
    diff_chars: usize,
}

impl<E: EmbeddingProvider> SemanticStrategy<E> {
    pub fn new(provider: E, diff_chars: usize) -> Self {
        Self {
            provider,
            diff_chars,
        }
    }
}

impl<E: EmbeddingProvider> RetrievalStrategy for SemanticStrategy<E> {
    fn name(&self) -> &str {
        NAME
    }

    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>> {
        let text = query.search_text(self.diff_chars);
        if text.trim().is_empty() || context.embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .provider
            .embed(std::slice::from_ref(&text))?
            .into_iter()
            .next()
            .ok_or_else(|| UnderstoryError::Embedding("no vector for query".into()))?;

        let by_id: HashMap<String, &CodeChunk> =
            context.chunks.iter().map(|c| (c.id(), c)).collect();

        let mut items = Vec::new();
        for index in context.embeddings {
            if !is_compatible(index, &self.provider) {
                debug!(shard = %index.shard_id, model = %index.model, "Skipping index from another model");
                continue;
            }
            for (chunk_id, vector) in index.iter() {
                let Some(chunk) = by_id.get(chunk_id) else {
                    continue;
                };
                let similarity = cosine_similarity(&query_vec, vector);
                if similarity > 0.0 {
                    items.push(ContextItem::from_chunk(chunk, f64::from(similarity), NAME));
                }
            }
        }
        rank(&mut items);
        Ok(fill_budget(items, budget))
    }
}
