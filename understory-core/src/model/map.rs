//! The codebase map: root aggregate owning file entries and the graph

use super::{CommitSha, DependencyGraph, Edge, EdgeKind, FilePath, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One indexed file. Replaced wholesale on re-index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: FilePath,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    /// Repository paths this file imports (already resolved).
    #[serde(default)]
    pub imports: Vec<FilePath>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub last_indexed: CommitSha,
}

impl FileEntry {
    pub fn new(path: impl Into<FilePath>) -> Self {
        Self {
            path: path.into(),
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            last_indexed: CommitSha::default(),
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_imports<I, P>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FilePath>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exports(mut self, exports: Vec<String>) -> Self {
        self.exports = exports;
        self
    }

    pub fn indexed_at(mut self, commit: CommitSha) -> Self {
        self.last_indexed = commit;
        self
    }

    /// Symbol whose range contains `line`, preferring the innermost.
    pub fn symbol_at(&self, line: usize) -> Option<&Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.contains_line(line))
            .min_by_key(|s| s.line_range.1.saturating_sub(s.line_range.0))
    }

    fn same_structure(&self, other: &FileEntry) -> bool {
        self.symbols == other.symbols && self.imports == other.imports && self.exports == other.exports
    }
}

/// Files, symbols and import edges of one repository at one commit.
///
/// The graph may hold edges whose endpoints are not in `files`; that is
/// what a partially loaded map looks like.
#[derive(Debug, Clone, Default)]
pub struct CodebaseMap {
    indexed_at: CommitSha,
    files: HashMap<FilePath, FileEntry>,
    graph: DependencyGraph,
}

impl CodebaseMap {
    pub fn new(indexed_at: CommitSha) -> Self {
        Self {
            indexed_at,
            ..Self::default()
        }
    }

    pub fn indexed_at(&self) -> &CommitSha {
        &self.indexed_at
    }

    pub fn set_indexed_at(&mut self, commit: CommitSha) {
        self.indexed_at = commit;
    }

    /// Insert or replace a file entry and rebuild its outgoing import edges.
    ///
    /// Returns true when the file is new or its symbols, imports or exports
    /// differ from the previous entry.
    pub fn upsert(&mut self, entry: FileEntry) -> bool {
        let changed = match self.files.get(&entry.path) {
            Some(previous) => !previous.same_structure(&entry),
            None => true,
        };

        self.graph.remove_outgoing(&entry.path);
        for target in &entry.imports {
            if *target == entry.path {
                continue;
            }
            self.graph.add_edge(Edge::new(
                entry.path.clone(),
                target.clone(),
                EdgeKind::Imports,
            ));
        }
        self.files.insert(entry.path.clone(), entry);
        changed
    }

    /// Drop a file and its outgoing edges. Incoming edges stay: they still
    /// describe what the importing files reference.
    pub fn remove(&mut self, path: &FilePath) -> Option<FileEntry> {
        let removed = self.files.remove(path)?;
        self.graph.remove_outgoing(path);
        Some(removed)
    }

    /// Stores an entry as-is, leaving the graph alone. Used when
    /// reassembling from shards, where edges are restored separately.
    pub(crate) fn insert_stored(&mut self, entry: FileEntry) {
        self.files.insert(entry.path.clone(), entry);
    }

    /// Inserts an edge without touching file entries.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.graph.add_edge(edge)
    }

    /// Indexed paths in lexical order.
    pub fn files(&self) -> Vec<&FilePath> {
        let mut paths: Vec<&FilePath> = self.files.keys().collect();
        paths.sort();
        paths
    }

    pub fn get(&self, path: &FilePath) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        self.files.contains_key(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
