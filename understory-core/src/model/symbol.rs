//! Symbols produced by the parser for each file

use serde::{Deserialize, Serialize};

/// Kind of a parsed symbol (stored as a lowercase string)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Trait,
    Module,
    Variable,
    /// Anything an external producer reports that we don't model
    Other,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Other => "other",
        }
    }

    /// Unknown kinds map to `Other` rather than failing.
    pub fn parse(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "struct" => Self::Struct,
            "interface" => Self::Interface,
            "trait" => Self::Trait,
            "module" => Self::Module,
            "variable" => Self::Variable,
            _ => Self::Other,
        }
    }

    /// Container kinds own nested symbols (methods, fields).
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Interface | Self::Trait | Self::Module
        )
    }
}

impl Serialize for SymbolKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SymbolKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SymbolKind::parse(&s))
    }
}

/// A named definition inside a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed, inclusive
    pub line_range: (usize, usize),
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, line_range: (usize, usize)) -> Self {
        Self {
            name: name.into(),
            kind,
            line_range,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.line_range.0 <= line && line <= self.line_range.1
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.line_range.0 <= end && start <= self.line_range.1
    }

    /// One-line rendering used by outlines and the structural strategy.
    pub fn describe(&self) -> String {
        match &self.signature {
            Some(sig) => format!("{} {}{}", self.kind.as_str(), self.name, sig),
            None => format!("{} {}", self.kind.as_str(), self.name),
        }
    }
}
