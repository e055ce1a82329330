//! Directed file-level dependency graph

use super::FilePath;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Edge type (stored as a lowercase string)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Imports,
    Calls,
    TypeRef,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::TypeRef => "type_ref",
        }
    }

    /// Unknown kinds are treated as plain imports.
    pub fn parse(s: &str) -> Self {
        match s {
            "calls" => Self::Calls,
            "type_ref" => Self::TypeRef,
            _ => Self::Imports,
        }
    }
}

impl Serialize for EdgeKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EdgeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(EdgeKind::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: FilePath,
    pub target: FilePath,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: FilePath, target: FilePath, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }

    pub fn imports(source: impl Into<FilePath>, target: impl Into<FilePath>) -> Self {
        Self::new(source.into(), target.into(), EdgeKind::Imports)
    }
}

/// Adjacency over `Edge`, indexed forward (dependencies-of) and backward
/// (dependents-of).
///
/// Endpoints need not exist as file entries in the owning map: edges into
/// shards that were never loaded are kept so partial loads stay connected.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: HashMap<FilePath, BTreeSet<Edge>>,
    backward: HashMap<FilePath, BTreeSet<Edge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the edge was already present.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let inserted = self
            .forward
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.clone());
        if inserted {
            self.backward
                .entry(edge.target.clone())
                .or_default()
                .insert(edge);
        }
        inserted
    }

    pub fn contains(&self, edge: &Edge) -> bool {
        self.forward
            .get(&edge.source)
            .is_some_and(|edges| edges.contains(edge))
    }

    /// Drop every edge originating at `source`, returning them.
    pub fn remove_outgoing(&mut self, source: &FilePath) -> Vec<Edge> {
        let Some(edges) = self.forward.remove(source) else {
            return Vec::new();
        };
        for edge in &edges {
            if let Some(incoming) = self.backward.get_mut(&edge.target) {
                incoming.remove(edge);
                if incoming.is_empty() {
                    self.backward.remove(&edge.target);
                }
            }
        }
        edges.into_iter().collect()
    }

    pub fn outgoing(&self, source: &FilePath) -> impl Iterator<Item = &Edge> {
        self.forward.get(source).into_iter().flatten()
    }

    pub fn incoming(&self, target: &FilePath) -> impl Iterator<Item = &Edge> {
        self.backward.get(target).into_iter().flatten()
    }

    /// Files `path` depends on, in lexical order.
    pub fn dependencies_of(&self, path: &FilePath) -> Vec<&FilePath> {
        let targets: BTreeSet<&FilePath> = self.outgoing(path).map(|e| &e.target).collect();
        targets.into_iter().collect()
    }

    /// Files that depend on `path`, in lexical order.
    pub fn dependents_of(&self, path: &FilePath) -> Vec<&FilePath> {
        let sources: BTreeSet<&FilePath> = self.incoming(path).map(|e| &e.source).collect();
        sources.into_iter().collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.forward.values().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
