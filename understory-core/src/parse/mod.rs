//! Parser collaborator: file text to `FileEntry`

mod imports;
mod syntax;

pub use syntax::TreeSitterParser;

use crate::model::{FileEntry, FilePath};
use crate::Result;

/// Turns one file's content into symbols, imports and exports.
///
/// Fails with `UnderstoryError::Parse` on unsupported or malformed input;
/// callers skip the file.
pub trait Parser: Send + Sync {
    fn parse(&self, path: &FilePath, content: &str) -> Result<FileEntry>;
}

impl<T: Parser + ?Sized> Parser for &T {
    fn parse(&self, path: &FilePath, content: &str) -> Result<FileEntry> {
        (**self).parse(path, content)
    }
}

/// Languages with a tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Language {
    pub fn from_path(path: &FilePath) -> Option<Self> {
        match path.extension()? {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_path(&"src/main.rs".into()), Some(Language::Rust));
        assert_eq!(Language::from_path(&"app.tsx".into()), Some(Language::Tsx));
        assert_eq!(Language::from_path(&"script.js".into()), Some(Language::JavaScript));
        assert_eq!(Language::from_path(&"main.go".into()), Some(Language::Go));
        assert_eq!(Language::from_path(&"README.md".into()), None);
    }
}
