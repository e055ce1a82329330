//! Dependency-graph walk outward from the changed files

use super::{ContextItem, RetrievalContext, RetrievalQuery, RetrievalStrategy};
use crate::chunker::CodeChunk;
use crate::model::{FilePath, TokenCount};
use crate::tokens::estimate_tokens;
use crate::Result;
use std::collections::BTreeSet;

const NAME: &str = "structural";
/// Dependencies rank just below dependents at the same distance
const DEPENDENCY_WEIGHT: f64 = 0.9;

/// Breadth-first walk over the dependency graph. At each hop dependents
/// come before dependencies, each group in path order. A file is offered
/// with its full chunked content when that fits, else as a symbol outline.
pub struct StructuralStrategy {
    max_hops: usize,
}

impl Default for StructuralStrategy {
    fn default() -> Self {
        Self::new(2)
    }
}

impl StructuralStrategy {
    pub fn new(max_hops: usize) -> Self {
        Self {
            max_hops: max_hops.max(1),
        }
    }

    /// Related files in visiting order, with their score.
    fn walk(&self, query: &RetrievalQuery, context: &RetrievalContext<'_>) -> Vec<(FilePath, f64)> {
        let graph = context.map.graph();
        let mut visited: BTreeSet<FilePath> = query.changed_files.iter().cloned().collect();
        let mut frontier: BTreeSet<FilePath> = visited.clone();
        let mut ordered = Vec::new();

        for hop in 1..=self.max_hops {
            let mut dependents = BTreeSet::new();
            let mut dependencies = BTreeSet::new();
            for file in &frontier {
                dependents.extend(graph.dependents_of(file).into_iter().cloned());
                dependencies.extend(graph.dependencies_of(file).into_iter().cloned());
            }

            let distance = hop as f64;
            let mut next = BTreeSet::new();
            for path in dependents {
                if visited.insert(path.clone()) {
                    ordered.push((path.clone(), 1.0 / distance));
                    next.insert(path);
                }
            }
            for path in dependencies {
                if visited.insert(path.clone()) {
                    ordered.push((path.clone(), DEPENDENCY_WEIGHT / distance));
                    next.insert(path);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        ordered
    }
}

impl RetrievalStrategy for StructuralStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>> {
        let mut used = TokenCount::ZERO;
        let mut items = Vec::new();

        for (path, score) in self.walk(query, context) {
            if used >= budget {
                break;
            }
            let remaining = budget.saturating_sub(used);
            let candidates = [file_content(&path, context.chunks), file_outline(&path, context)];
            let Some((content, cost)) = candidates
                .into_iter()
                .flatten()
                .map(|content| {
                    let cost = estimate_tokens(&content);
                    (content, cost)
                })
                .find(|(_, cost)| *cost <= remaining)
            else {
                continue;
            };
            used += cost;
            items.push(ContextItem {
                source: path,
                content,
                relevance_score: score,
                token_cost: cost,
                strategy: NAME.to_string(),
                symbol: None,
            });
        }
        Ok(items)
    }
}

/// The file's chunks stitched back together in line order.
fn file_content(path: &FilePath, chunks: &[CodeChunk]) -> Option<String> {
    let mut parts: Vec<&CodeChunk> = chunks.iter().filter(|c| c.source == *path).collect();
    if parts.is_empty() {
        return None;
    }
    parts.sort_by_key(|c| c.line_range);
    let body: Vec<&str> = parts.iter().map(|c| c.content.as_str()).collect();
    Some(body.join("\n"))
}

fn file_outline(path: &FilePath, context: &RetrievalContext<'_>) -> Option<String> {
    let entry = context.map.get(path)?;
    let mut out = format!("{path}\n");
    for symbol in &entry.symbols {
        out.push_str("  ");
        out.push_str(&symbol.describe());
        out.push('\n');
    }
    Some(out)
}
