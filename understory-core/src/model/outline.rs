//! Compact, budget-sized projection of a codebase map

use super::{CodebaseMap, FilePath, TokenCount};
use crate::tokens::estimate_tokens;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutlineEntry {
    pub path: FilePath,
    /// `describe()` of each symbol, in file order
    pub symbols: Vec<String>,
}

impl FileOutlineEntry {
    fn render(&self) -> String {
        let mut out = format!("{}\n", self.path);
        for symbol in &self.symbols {
            out.push_str("  ");
            out.push_str(symbol);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseOutline {
    pub files: Vec<FileOutlineEntry>,
    #[serde(default)]
    pub total_files: usize,
}

impl CodebaseOutline {
    /// Files in path order; once the next file would cross `budget` it is
    /// dropped whole and so is everything after it.
    pub fn from_map(map: &CodebaseMap, budget: TokenCount) -> Self {
        let mut files = Vec::new();
        let mut used = TokenCount::ZERO;

        for path in map.files() {
            let Some(entry) = map.get(path) else { continue };
            let outline = FileOutlineEntry {
                path: path.clone(),
                symbols: entry.symbols.iter().map(|s| s.describe()).collect(),
            };
            let cost = estimate_tokens(&outline.render());
            if used + cost > budget {
                break;
            }
            used += cost;
            files.push(outline);
        }

        Self {
            files,
            total_files: map.len(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.files.len() < self.total_files
    }

    /// Text handed to the pattern analyzer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            out.push_str(&file.render());
        }
        if self.is_truncated() {
            out.push_str(&format!(
                "... ({} of {} files shown)\n",
                self.files.len(),
                self.total_files
            ));
        }
        out
    }
}
