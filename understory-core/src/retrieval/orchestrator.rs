//! Runs every strategy under its own sub-budget and merges the results

use super::{fill_budget, rank, ContextItem, RetrievalContext, RetrievalQuery, RetrievalStrategy};
use crate::model::{FilePath, TokenCount};
use rayon::prelude::*;
use std::collections::hash_map::{Entry, HashMap};
use tracing::{debug, info, warn, Span};

struct Registered {
    strategy: Box<dyn RetrievalStrategy>,
    /// Share of the total budget
    ratio: f64,
}

pub struct RetrievalOrchestrator {
    strategies: Vec<Registered>,
    span: Span,
}

impl RetrievalOrchestrator {
    pub fn new(span: Span) -> Self {
        Self {
            strategies: Vec::new(),
            span,
        }
    }

    /// Register `strategy` with `ratio` of the total budget.
    pub fn register(mut self, strategy: Box<dyn RetrievalStrategy>, ratio: f64) -> Self {
        self.strategies.push(Registered { strategy, ratio });
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|r| r.strategy.name()).collect()
    }

    /// Run all strategies concurrently, deduplicate by `(source, content)`
    /// keeping the higher score, then fill `budget` by descending score.
    ///
    /// A failing strategy is logged and contributes nothing.
    pub fn retrieve(
        &self,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        budget: TokenCount,
    ) -> Vec<ContextItem> {
        let results: Vec<Vec<ContextItem>> = self
            .strategies
            .par_iter()
            .map(|registered| self.run_one(registered, query, context, budget))
            .collect();

        let produced: usize = results.iter().map(Vec::len).sum();
        let mut merged = merge(results);
        rank(&mut merged);
        let selected = fill_budget(merged, budget);

        info!(
            parent: &self.span,
            strategies = self.strategies.len(),
            produced,
            selected = selected.len(),
            tokens = selected.iter().map(|i| i.token_cost).sum::<TokenCount>().get(),
            budget = budget.get(),
            "Retrieved context"
        );
        selected
    }

    fn run_one(
        &self,
        registered: &Registered,
        query: &RetrievalQuery,
        context: &RetrievalContext<'_>,
        total: TokenCount,
    ) -> Vec<ContextItem> {
        let name = registered.strategy.name();
        let sub_budget = total.scaled(registered.ratio);
        if sub_budget == TokenCount::ZERO {
            return Vec::new();
        }
        match registered.strategy.retrieve(query, context, sub_budget) {
            // Re-check the sub-budget in case a strategy overshoots
            Ok(items) => {
                let items = fill_budget(items, sub_budget);
                debug!(parent: &self.span, strategy = name, items = items.len(), budget = sub_budget.get(), "Strategy finished");
                items
            }
            Err(e) => {
                warn!(parent: &self.span, strategy = name, error = %e, "Retrieval strategy failed; skipping");
                Vec::new()
            }
        }
    }
}

/// Concatenate per-strategy results, keeping one copy of each
/// `(source, content)`: the one with the higher score.
fn merge(results: Vec<Vec<ContextItem>>) -> Vec<ContextItem> {
    let mut merged: Vec<ContextItem> = Vec::new();
    let mut positions: HashMap<(FilePath, String), usize> = HashMap::new();
    for item in results.into_iter().flatten() {
        match positions.entry((item.source.clone(), item.content.clone())) {
            Entry::Occupied(slot) => {
                let kept = &mut merged[*slot.get()];
                if item.relevance_score > kept.relevance_score {
                    *kept = item;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{item, sample_map};
    use super::super::total_cost;
    use super::*;
    use crate::error::UnderstoryError;
    use crate::Result;
    use std::collections::HashSet;

    struct Canned {
        name: &'static str,
        items: Vec<ContextItem>,
    }

    impl RetrievalStrategy for Canned {
        fn name(&self) -> &str {
            self.name
        }

        fn retrieve(
            &self,
            _query: &RetrievalQuery,
            _context: &RetrievalContext<'_>,
            budget: TokenCount,
        ) -> Result<Vec<ContextItem>> {
            Ok(fill_budget(self.items.clone(), budget))
        }
    }

    struct Broken;

    impl RetrievalStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn retrieve(
            &self,
            _query: &RetrievalQuery,
            _context: &RetrievalContext<'_>,
            _budget: TokenCount,
        ) -> Result<Vec<ContextItem>> {
            Err(UnderstoryError::strategy("broken", "index missing"))
        }
    }

    fn canned(name: &'static str, items: Vec<ContextItem>) -> Box<dyn RetrievalStrategy> {
        Box::new(Canned { name, items })
    }

    #[test]
    fn deduplicates_keeping_the_higher_score() {
        let map = sample_map();
        let context = RetrievalContext::new(&map, &[]);
        let orchestrator = RetrievalOrchestrator::new(Span::none())
            .register(canned("a", vec![item("x.py", "body", 0.4, 10), item("y.py", "y", 0.3, 10)]), 0.5)
            .register(canned("b", vec![item("x.py", "body", 0.9, 10)]), 0.5);

        let items = orchestrator.retrieve(&RetrievalQuery::default(), &context, TokenCount::new(100));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source.as_str(), "x.py");
        assert_eq!(items[0].relevance_score, 0.9);
        let keys: HashSet<(&str, &str)> = items
            .iter()
            .map(|i| (i.source.as_str(), i.content.as_str()))
            .collect();
        assert_eq!(keys.len(), items.len());
    }

    #[test]
    fn merge_keeps_first_position_and_distinct_content() {
        let merged = merge(vec![
            vec![item("a.py", "one", 0.2, 5), item("a.py", "two", 0.5, 5)],
            vec![item("b.py", "one", 0.4, 5), item("a.py", "one", 0.8, 5)],
        ]);

        let keys: Vec<(&str, &str, f64)> = merged
            .iter()
            .map(|i| (i.source.as_str(), i.content.as_str(), i.relevance_score))
            .collect();
        assert_eq!(
            keys,
            vec![("a.py", "one", 0.8), ("a.py", "two", 0.5), ("b.py", "one", 0.4)]
        );
    }

    #[test]
    fn failing_strategy_is_skipped() {
        let map = sample_map();
        let context = RetrievalContext::new(&map, &[]);
        let orchestrator = RetrievalOrchestrator::new(Span::none())
            .register(Box::new(Broken), 0.5)
            .register(canned("ok", vec![item("a.py", "a", 0.5, 5)]), 0.5);

        let items = orchestrator.retrieve(&RetrievalQuery::default(), &context, TokenCount::new(100));
        assert_eq!(items.len(), 1);
        assert_eq!(orchestrator.strategy_names(), vec!["broken", "ok"]);
    }

    #[test]
    fn sub_budgets_and_overall_budget_hold() {
        let map = sample_map();
        let context = RetrievalContext::new(&map, &[]);
        let many: Vec<ContextItem> = (0..10)
            .map(|i| item(&format!("f{i}.py"), "c", 1.0 - i as f64 / 100.0, 10))
            .collect();
        let orchestrator = RetrievalOrchestrator::new(Span::none())
            .register(canned("big", many), 0.3)
            .register(canned("small", vec![item("s.py", "s", 0.1, 10)]), 0.7);

        let items = orchestrator.retrieve(&RetrievalQuery::default(), &context, TokenCount::new(100));

        // "big" is held to 30 tokens even though "small" leaves slack
        assert_eq!(items.iter().filter(|i| i.source.as_str() != "s.py").count(), 3);
        assert!(total_cost(&items) <= TokenCount::new(100));
    }

    #[test]
    fn overall_budget_caps_the_merge() {
        let map = sample_map();
        let context = RetrievalContext::new(&map, &[]);
        let orchestrator = RetrievalOrchestrator::new(Span::none())
            .register(canned("a", vec![item("a.py", "a", 0.9, 40)]), 1.0)
            .register(canned("b", vec![item("b.py", "b", 0.8, 40)]), 1.0);

        let items = orchestrator.retrieve(&RetrievalQuery::default(), &context, TokenCount::new(50));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source.as_str(), "a.py");
    }
}
