//! LLM-guided iterative search with a fallback strategy

use super::{fill_budget, rank, ContextItem, RetrievalContext, RetrievalQuery, RetrievalStrategy};
use crate::agent::{complete_typed, Agent, AgentRequest};
use crate::model::{FilePath, TokenCount};
use crate::Result;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, warn, Span};

const NAME: &str = "agentic";
/// Candidate paths listed in each prompt
const MAX_LISTED_FILES: usize = 200;

#[derive(Debug, Default, Deserialize)]
struct SearchPlan {
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    symbols: Vec<String>,
    /// The agent has seen enough
    #[serde(default)]
    done: bool,
}

/// Asks the agent, up to `max_iterations` times, which files and symbols
/// to look at next. Any agent failure, or running out of iterations before
/// the agent reports it is done, hands the query to `fallback`.
pub struct AgenticStrategy<A> {
    agent: A,
    fallback: Box<dyn RetrievalStrategy>,
    max_iterations: usize,
    diff_chars: usize,
    span: Span,
}

impl<A: Agent> AgenticStrategy<A> {
    pub fn new(
        agent: A,
        fallback: Box<dyn RetrievalStrategy>,
        max_iterations: usize,
        diff_chars: usize,
        span: Span,
    ) -> Self {
        Self {
            agent,
            fallback,
            max_iterations: max_iterations.max(1),
            diff_chars,
            span,
        }
    }

    fn search(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
    ) -> Result<Option<Vec<ContextItem>>> {
        let mut gathered: Vec<ContextItem> = Vec::new();
        let mut seen_chunks: BTreeSet<String> = BTreeSet::new();

        for iteration in 0..self.max_iterations {
            let request = self.request(query, context, &gathered, iteration);
            let plan: SearchPlan = complete_typed(&self.agent, &request)?;
            debug!(
                parent: &self.span,
                iteration,
                files = plan.files.len(),
                symbols = plan.symbols.len(),
                done = plan.done,
                "Search plan"
            );

            let files: BTreeSet<FilePath> = plan.files.iter().map(FilePath::new).collect();
            let symbols: BTreeSet<&str> = plan.symbols.iter().map(String::as_str).collect();
            // Earlier rounds are the agent's first picks
            let score = 1.0 / (iteration as f64 + 1.0);
            for chunk in context.chunks {
                if !(files.contains(&chunk.source) || symbols.contains(chunk.symbol_name.as_str())) {
                    continue;
                }
                if seen_chunks.insert(chunk.id()) {
                    gathered.push(ContextItem::from_chunk(chunk, score, NAME));
                }
            }

            if plan.done {
                return Ok(Some(gathered));
            }
        }
        Ok(None)
    }

    fn request(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        gathered: &[ContextItem],
        iteration: usize,
    ) -> AgentRequest {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Round {} of {}.", iteration + 1, self.max_iterations);
        let _ = writeln!(prompt, "\nChanged files:");
        for file in &query.changed_files {
            let _ = writeln!(prompt, "- {file}");
        }
        let _ = writeln!(prompt, "\nChange summary:\n{}", query.search_text(self.diff_chars));

        let _ = writeln!(prompt, "\nRepository files:");
        for path in context.map.files().into_iter().take(MAX_LISTED_FILES) {
            let _ = writeln!(prompt, "- {path}");
        }
        if !gathered.is_empty() {
            let _ = writeln!(prompt, "\nAlready gathered:");
            for item in gathered {
                let symbol = item.symbol.as_deref().unwrap_or("");
                let _ = writeln!(prompt, "- {} {}", item.source, symbol);
            }
        }

        AgentRequest::new("search_plan", search_plan_schema(), prompt).with_system(
            "You choose which code a reviewer needs to see to judge a change. \
             Name files and symbols to read next, and set done once the context is sufficient.",
        )
    }
}

impl<A: Agent> RetrievalStrategy for AgenticStrategy<A> {
    fn name(&self) -> &str {
        NAME
    }

    fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Result<Vec<ContextItem>> {
        match self.search(query, context) {
            Ok(Some(mut items)) => {
                rank(&mut items);
                Ok(fill_budget(items, budget))
            }
            Ok(None) => {
                debug!(
                    parent: &self.span,
                    fallback = self.fallback.name(),
                    "Iterations exhausted; using fallback"
                );
                self.fallback.retrieve(query, context, budget)
            }
            Err(e) => {
                warn!(
                    parent: &self.span,
                    error = %e,
                    fallback = self.fallback.name(),
                    "Agentic search failed; using fallback"
                );
                self.fallback.retrieve(query, context, budget)
            }
        }
    }
}

fn search_plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "files": {"type": "array", "items": {"type": "string"}},
            "symbols": {"type": "array", "items": {"type": "string"}},
            "done": {"type": "boolean"}
        },
        "required": ["files", "symbols", "done"]
    })
}
