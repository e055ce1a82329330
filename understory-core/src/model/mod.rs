//! Value types and the in-memory codebase graph

mod checkpoint;
mod embedding;
mod graph;
pub(crate) mod ids;
mod map;
mod outline;
mod pattern;
mod symbol;

pub use checkpoint::{plan_update, Checkpoint, UpdatePlan};
pub use embedding::EmbeddingIndex;
pub use graph::{DependencyGraph, Edge, EdgeKind};
pub use ids::{CommitSha, FilePath, ShardId, TokenCount};
pub use map::{CodebaseMap, FileEntry};
pub use outline::{CodebaseOutline, FileOutlineEntry};
pub use pattern::{CodebaseMemory, PatternCategory, PatternEntry};
pub use symbol::{Symbol, SymbolKind};
