//! Understory Core - Codebase context engine for pull-request review
//!
//! This library maintains a structural map of a codebase (files, symbols,
//! import edges), persists it as directory-scoped JSON shards on a dedicated
//! branch of the hosted repository, and answers "what context is relevant to
//! this diff" under a hard token budget.

pub mod agent;
pub mod chunker;
pub mod config;
pub mod content;
pub mod diff;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod memory;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod retrieval;
pub mod shard;
pub mod store;
pub mod sync;
pub mod tokens;
pub mod vcs;

pub use agent::{Agent, AgentRequest};
pub use chunker::{Chunker, CodeChunk};
pub use config::Config;
pub use content::{ContentSource, LocalContentSource, PathFilter, VcsContentSource};
pub use embedding::EmbeddingProvider;
pub use error::UnderstoryError;
pub use indexing::{IndexReport, IndexingService};
pub use memory::{AgentPatternAnalyzer, PatternAnalyzer, PatternMemoryService};
pub use model::{
    Checkpoint, CodebaseMap, CodebaseMemory, CodebaseOutline, CommitSha, DependencyGraph, Edge,
    EdgeKind, EmbeddingIndex, FileEntry, FileOutlineEntry, FilePath, PatternCategory,
    PatternEntry, ShardId, Symbol, SymbolKind, TokenCount, UpdatePlan,
};
pub use parse::{Parser, TreeSitterParser};
pub use pipeline::{
    build_orchestrator, candidate_files, chunk_files, parser_for, PullMode, PushOutcome,
    ReviewContext, ReviewPipeline,
};
pub use retrieval::{
    ContextItem, RetrievalContext, RetrievalOrchestrator, RetrievalQuery, RetrievalStrategy,
};
pub use shard::{ShardDescriptor, ShardPayload, ShardedManifest};
pub use store::LocalStore;
pub use sync::BranchSync;
pub use tokens::estimate_tokens;
pub use vcs::VcsClient;

/// Result type alias for understory operations
pub type Result<T> = std::result::Result<T, UnderstoryError>;
