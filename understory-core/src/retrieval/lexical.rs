//! Sparse term matching (BM25) over code chunks

use super::{fill_budget, rank, ContextItem, RetrievalContext, RetrievalQuery, RetrievalStrategy};
use crate::chunker::CodeChunk;
use crate::model::TokenCount;
use crate::Result;
use std::collections::{HashMap, HashSet};

const NAME: &str = "lexical";
const K1: f64 = 1.2;
const B: f64 = 0.75;

pub struct LexicalStrategy {
    diff_chars: usize,
}

impl Default for LexicalStrategy {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl LexicalStrategy {
    /// `diff_chars` bounds how much of the diff contributes query terms.
    pub fn new(diff_chars: usize) -> Self {
        Self { diff_chars }
    }
}

impl RetrievalStrategy for LexicalStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>> {
        let terms: HashSet<String> = split_terms(&query.search_text(self.diff_chars))
            .into_iter()
            .collect();
        if terms.is_empty() || context.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let index = TermIndex::build(context.chunks);
        let scores = index.score(&terms);
        let best = scores.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if best <= 0.0 {
            return Ok(Vec::new());
        }

        // Normalized into (0, 1] so scores compare across strategies
        let mut items: Vec<ContextItem> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(idx, score)| ContextItem::from_chunk(&context.chunks[idx], score / best, NAME))
            .collect();
        rank(&mut items);
        Ok(fill_budget(items, budget))
    }
}

/// Term frequencies per chunk plus document frequencies.
struct TermIndex {
    docs: Vec<HashMap<String, usize>>,
    lengths: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl TermIndex {
    fn build(chunks: &[CodeChunk]) -> Self {
        let mut docs = Vec::with_capacity(chunks.len());
        let mut lengths = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for chunk in chunks {
            let terms = split_terms(&chunk.index_text());
            lengths.push(terms.len());
            let mut tf: HashMap<String, usize> = HashMap::new();
            for term in terms {
                *tf.entry(term).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(tf);
        }

        let total: usize = lengths.iter().sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total as f64 / docs.len() as f64
        };
        Self {
            docs,
            lengths,
            doc_freq,
            avg_len,
        }
    }

    /// BM25 score per chunk index.
    fn score(&self, terms: &HashSet<String>) -> Vec<(usize, f64)> {
        let n = self.docs.len() as f64;
        self.docs
            .iter()
            .enumerate()
            .map(|(idx, tf)| {
                let dl = self.lengths[idx] as f64;
                let score = terms
                    .iter()
                    .filter_map(|term| {
                        let freq = *tf.get(term)? as f64;
                        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let denom = freq + K1 * (1.0 - B + B * dl / self.avg_len.max(1e-3));
                        Some(idf * freq * (K1 + 1.0) / denom)
                    })
                    .sum();
                (idx, score)
            })
            .collect()
    }
}

/// Lowercased identifier terms. `snake_case` and `camelCase` names also
/// contribute their parts.
pub(crate) fn split_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() >= 2)
    {
        let lower = word.to_lowercase();
        let parts = identifier_parts(word);
        if parts.len() > 1 {
            terms.extend(parts.into_iter().filter(|p| p.len() >= 2 && *p != lower));
        }
        terms.push(lower);
    }
    terms
}

fn identifier_parts(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in word.split('_').filter(|p| !p.is_empty()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in piece.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                parts.push(current.to_lowercase());
                current.clear();
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}
