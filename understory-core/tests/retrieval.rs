//! Budgeted retrieval over real parsed and chunked files.

mod common;

use common::HashingEmbedder;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Span;
use understory_core::embedding::build_embedding_index;
use understory_core::retrieval::{
    LexicalStrategy, SemanticStrategy, StructuralStrategy,
};
use understory_core::{
    Chunker, CodebaseMap, CodeChunk, CommitSha, ContextItem, FilePath, IndexingService, Parser,
    RetrievalContext, RetrievalOrchestrator, RetrievalQuery, ShardId, TokenCount,
    TreeSitterParser,
};

const FILES: &[(&str, &str)] = &[
    (
        "billing/invoice.py",
        "from billing.tax import rate\n\ndef total(amount):\n    return amount * (1 + rate())\n\ndef render_invoice(amount):\n    return f\"Total: {total(amount)}\"\n",
    ),
    ("billing/tax.py", "def rate():\n    return 0.2\n"),
    (
        "web/checkout.py",
        "from billing.invoice import total\n\ndef checkout(cart):\n    return total(sum(cart))\n",
    ),
    (
        "web/health.py",
        "def ping():\n    return 'ok'\n",
    ),
];

struct Fixture {
    map: CodebaseMap,
    chunks: Vec<CodeChunk>,
}

fn fixture() -> Fixture {
    let parser = TreeSitterParser::new().with_known_files(FILES.iter().map(|(p, _)| FilePath::new(*p)));
    let mut map = CodebaseMap::new(CommitSha::new("c1"));
    let chunker = Chunker::new(TokenCount::new(64));
    let mut chunks = Vec::new();
    for (path, text) in FILES {
        let entry = parser.parse(&FilePath::new(*path), text).unwrap();
        chunks.extend(chunker.chunk_file(&entry, text));
        map.upsert(entry);
    }
    Fixture { map, chunks }
}

fn unique_keys(items: &[ContextItem]) -> bool {
    let keys: HashSet<(&str, &str)> = items
        .iter()
        .map(|i| (i.source.as_str(), i.content.as_str()))
        .collect();
    keys.len() == items.len()
}

#[test]
fn orchestrated_context_respects_budget_and_is_unique() {
    let fixture = fixture();
    let embedder = Arc::new(HashingEmbedder::new(16));
    let embeddings: Vec<_> = ["billing", "web"]
        .iter()
        .map(|dir| {
            let shard = ShardId::new(*dir);
            let chunks: Vec<CodeChunk> = fixture
                .chunks
                .iter()
                .filter(|c| c.source.shard_id() == shard)
                .cloned()
                .collect();
            build_embedding_index(&shard, &chunks, embedder.as_ref(), 8).unwrap()
        })
        .collect();
    let context = RetrievalContext::new(&fixture.map, &fixture.chunks).with_embeddings(&embeddings);

    let orchestrator = RetrievalOrchestrator::new(Span::none())
        .register(Box::new(StructuralStrategy::new(2)), 0.4)
        .register(Box::new(LexicalStrategy::default()), 0.3)
        .register(Box::new(SemanticStrategy::new(embedder, 500)), 0.3);
    let query = RetrievalQuery::new(vec![FilePath::new("billing/invoice.py")])
        .with_symbols(vec!["total".into()])
        .with_diff("-    return amount * (1 + rate())\n+    return round(amount * (1 + rate()), 2)");

    for budget in [20, 60, 200, 2000] {
        let budget = TokenCount::new(budget);
        let items = orchestrator.retrieve(&query, &context, budget);
        let spent: TokenCount = items.iter().map(|i| i.token_cost).sum();
        assert!(spent <= budget, "spent {spent} of {budget}");
        assert!(unique_keys(&items));
        for pair in items.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    let roomy = orchestrator.retrieve(&query, &context, TokenCount::new(2000));
    let sources: HashSet<&str> = roomy.iter().map(|i| i.source.as_str()).collect();
    assert!(sources.contains("web/checkout.py"));
    assert!(sources.contains("billing/tax.py"));
}

#[test]
fn structural_walk_reaches_two_hops() {
    let fixture = fixture();
    let context = RetrievalContext::new(&fixture.map, &fixture.chunks);
    let query = RetrievalQuery::new(vec![FilePath::new("billing/tax.py")]);

    let items = RetrievalOrchestrator::new(Span::none())
        .register(Box::new(StructuralStrategy::new(2)), 1.0)
        .retrieve(&query, &context, TokenCount::new(5000));

    let sources: Vec<&str> = items.iter().map(|i| i.source.as_str()).collect();
    assert_eq!(sources, vec!["billing/invoice.py", "web/checkout.py"]);
    assert!(items[0].relevance_score > items[1].relevance_score);
}

#[test]
fn reindexing_a_file_rewires_its_edges() {
    let mut fixture = fixture();
    struct One(&'static str);
    impl understory_core::ContentSource for One {
        fn fetch(&self, _path: &FilePath) -> understory_core::Result<String> {
            Ok(self.0.to_string())
        }
    }

    let parser = TreeSitterParser::new().with_known_files(FILES.iter().map(|(p, _)| FilePath::new(*p)));
    let checkout = FilePath::new("web/checkout.py");
    let report = IndexingService::new(CommitSha::new("c2"), Span::none()).index(
        &mut fixture.map,
        std::slice::from_ref(&checkout),
        &One("def checkout(cart):\n    return sum(cart)\n"),
        &parser,
    );

    assert!(report.changed.contains(&checkout));
    let invoice = FilePath::new("billing/invoice.py");
    assert!(fixture.map.graph().dependents_of(&invoice).is_empty());
}
