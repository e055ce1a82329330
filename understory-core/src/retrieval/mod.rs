//! Budgeted retrieval of review context
//!
//! Every strategy returns items whose summed `token_cost` fits the budget it
//! was given. An item that would cross the limit is skipped whole; smaller
//! items after it may still fit.

mod agentic;
mod lexical;
mod orchestrator;
mod semantic;
mod structural;

pub use agentic::AgenticStrategy;
pub use lexical::LexicalStrategy;
pub use orchestrator::RetrievalOrchestrator;
pub use semantic::SemanticStrategy;
pub use structural::StructuralStrategy;

use crate::chunker::CodeChunk;
use crate::diff::excerpt;
use crate::model::{CodebaseMap, EmbeddingIndex, FilePath, TokenCount};
use crate::Result;
use serde::{Deserialize, Serialize};

/// What changed in the pull request under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub changed_files: Vec<FilePath>,
    pub changed_symbols: Vec<String>,
    pub diff_text: String,
}

impl RetrievalQuery {
    pub fn new(changed_files: Vec<FilePath>) -> Self {
        Self {
            changed_files,
            ..Self::default()
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.changed_symbols = symbols;
        self
    }

    pub fn with_diff(mut self, diff_text: impl Into<String>) -> Self {
        self.diff_text = diff_text.into();
        self
    }

    /// Changed symbol names followed by the first `diff_chars` characters
    /// of the diff.
    pub fn search_text(&self, diff_chars: usize) -> String {
        let mut text = self.changed_symbols.join(" ");
        let diff = excerpt(&self.diff_text, diff_chars);
        if !diff.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(diff);
        }
        text
    }

    pub fn is_changed(&self, path: &FilePath) -> bool {
        self.changed_files.contains(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub source: FilePath,
    pub content: String,
    pub relevance_score: f64,
    pub token_cost: TokenCount,
    /// Strategy that produced the item
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl ContextItem {
    pub fn from_chunk(chunk: &CodeChunk, relevance_score: f64, strategy: &str) -> Self {
        Self {
            source: chunk.source.clone(),
            content: chunk.content.clone(),
            relevance_score,
            token_cost: chunk.tokens,
            strategy: strategy.to_string(),
            symbol: Some(chunk.symbol_name.clone()),
        }
    }
}

/// Read-only inputs shared by every strategy during one query.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalContext<'a> {
    pub map: &'a CodebaseMap,
    pub chunks: &'a [CodeChunk],
    pub embeddings: &'a [EmbeddingIndex],
}

impl<'a> RetrievalContext<'a> {
    pub fn new(map: &'a CodebaseMap, chunks: &'a [CodeChunk]) -> Self {
        Self {
            map,
            chunks,
            embeddings: &[],
        }
    }

    pub fn with_embeddings(mut self, embeddings: &'a [EmbeddingIndex]) -> Self {
        self.embeddings = embeddings;
        self
    }
}

/// One retrieval signal. Implementations must not mutate shared state.
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked items, most relevant first, with total cost within `budget`.
    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>>;
}

impl<T: RetrievalStrategy + ?Sized> RetrievalStrategy for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>> {
        (**self).retrieve(query, context, budget)
    }
}

/// Highest score first; ties by path then content so output is
/// deterministic.
pub(crate) fn rank(items: &mut [ContextItem]) {
    items.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.content.cmp(&b.content))
    });
}

/// Greedy fill in the given order. Items that would cross `budget` are
/// skipped, so the sum of costs never exceeds it.
pub fn fill_budget(items: impl IntoIterator<Item = ContextItem>, budget: TokenCount) -> Vec<ContextItem> {
    let mut used = TokenCount::ZERO;
    let mut kept = Vec::new();
    for item in items {
        if used + item.token_cost > budget {
            continue;
        }
        used += item.token_cost;
        kept.push(item);
    }
    kept
}

/// Sum of `token_cost` over `items`.
pub fn total_cost(items: &[ContextItem]) -> TokenCount {
    items.iter().map(|i| i.token_cost).sum()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{FileEntry, Symbol, SymbolKind};

    pub fn chunk(path: &str, symbol: &str, content: &str, tokens: usize) -> CodeChunk {
        CodeChunk {
            source: FilePath::new(path),
            symbol_name: symbol.to_string(),
            content: content.to_string(),
            tokens: TokenCount::new(tokens),
            line_range: (1, 1),
        }
    }

    pub fn item(path: &str, content: &str, score: f64, cost: usize) -> ContextItem {
        ContextItem {
            source: FilePath::new(path),
            content: content.to_string(),
            relevance_score: score,
            token_cost: TokenCount::new(cost),
            strategy: "test".to_string(),
            symbol: None,
        }
    }

    /// `src/auth/login.py` imports `src/db/models.py` and is imported by
    /// `src/api/routes.py` and `src/api/admin.py`.
    pub fn sample_map() -> CodebaseMap {
        let mut map = CodebaseMap::new(Default::default());
        map.upsert(
            FileEntry::new("src/auth/login.py")
                .with_symbols(vec![Symbol::new("login", SymbolKind::Function, (1, 10))])
                .with_imports(["src/db/models.py"]),
        );
        map.upsert(
            FileEntry::new("src/db/models.py")
                .with_symbols(vec![Symbol::new("User", SymbolKind::Class, (1, 20))]),
        );
        map.upsert(
            FileEntry::new("src/api/routes.py")
                .with_symbols(vec![Symbol::new("post_login", SymbolKind::Function, (1, 5))])
                .with_imports(["src/auth/login.py"]),
        );
        map.upsert(
            FileEntry::new("src/api/admin.py")
                .with_symbols(vec![Symbol::new("ban", SymbolKind::Function, (1, 5))])
                .with_imports(["src/auth/login.py"]),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::item;
    use super::*;

    #[test]
    fn fill_skips_items_that_do_not_fit() {
        let items = vec![item("a", "1", 0.9, 60), item("b", "2", 0.8, 50), item("c", "3", 0.7, 30)];
        let kept = fill_budget(items, TokenCount::new(100));
        let sources: Vec<&str> = kept.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "c"]);
        assert!(total_cost(&kept) <= TokenCount::new(100));
    }

    #[test]
    fn search_text_truncates_the_diff() {
        let query = RetrievalQuery::new(vec![])
            .with_symbols(vec!["login".into(), "User".into()])
            .with_diff("+ audit(user)\n+ more");
        assert_eq!(query.search_text(7), "login User\n+ audit");
    }
}
