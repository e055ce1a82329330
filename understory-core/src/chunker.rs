//! Symbol-bounded chunking of file content
//!
//! Each top-level symbol becomes one chunk. Lines no symbol covers (imports,
//! module-level statements) are grouped into `<module>` chunks. Anything over
//! the token limit is split into consecutive line windows.

use crate::model::{FileEntry, FilePath, Symbol, TokenCount};
use crate::tokens::estimate_tokens;
use serde::{Deserialize, Serialize};

pub const MODULE_CHUNK: &str = "<module>";

/// A unit of retrievable code. Rebuilt from content and symbols on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub source: FilePath,
    pub symbol_name: String,
    pub content: String,
    pub tokens: TokenCount,
    /// 1-indexed, inclusive
    pub line_range: (usize, usize),
}

impl CodeChunk {
    /// Stable identifier used to key embedding vectors.
    pub fn id(&self) -> String {
        format!(
            "{}:{}-{}",
            self.source, self.line_range.0, self.line_range.1
        )
    }

    /// Text fed to lexical and embedding indices.
    pub fn index_text(&self) -> String {
        format!("{} {}\n{}", self.source, self.symbol_name, self.content)
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chunk_tokens: TokenCount,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(TokenCount::new(512))
    }
}

impl Chunker {
    pub fn new(max_chunk_tokens: TokenCount) -> Self {
        Self {
            max_chunk_tokens: if max_chunk_tokens == TokenCount::ZERO {
                TokenCount::new(1)
            } else {
                max_chunk_tokens
            },
        }
    }

    pub fn chunk_file(&self, entry: &FileEntry, content: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let spans = top_level_spans(&entry.symbols, lines.len());
        let mut chunks = Vec::new();
        let mut cursor = 1;

        for (name, start, end) in spans {
            if start > cursor {
                self.push_module_run(&entry.path, &lines, cursor, start - 1, &mut chunks);
            }
            self.push_windows(&entry.path, name, &lines, start, end, &mut chunks);
            cursor = end + 1;
        }
        if cursor <= lines.len() {
            self.push_module_run(&entry.path, &lines, cursor, lines.len(), &mut chunks);
        }

        chunks
    }

    fn push_module_run(
        &self,
        path: &FilePath,
        lines: &[&str],
        start: usize,
        end: usize,
        out: &mut Vec<CodeChunk>,
    ) {
        // Blank gaps between definitions are not worth a chunk.
        let Some(first) = (start..=end).find(|&l| !lines[l - 1].trim().is_empty()) else {
            return;
        };
        let last = (first..=end)
            .rev()
            .find(|&l| !lines[l - 1].trim().is_empty())
            .unwrap_or(first);
        self.push_windows(path, MODULE_CHUNK, lines, first, last, out);
    }

    /// Emit `start..=end` as one chunk, or as line windows when it is over
    /// the limit. A single line over the limit is kept whole.
    fn push_windows(
        &self,
        path: &FilePath,
        name: &str,
        lines: &[&str],
        start: usize,
        end: usize,
        out: &mut Vec<CodeChunk>,
    ) {
        let whole = lines[start - 1..end].join("\n");
        let tokens = estimate_tokens(&whole);
        if tokens <= self.max_chunk_tokens {
            out.push(CodeChunk {
                source: path.clone(),
                symbol_name: name.to_string(),
                content: whole,
                tokens,
                line_range: (start, end),
            });
            return;
        }

        let mut window_start = start;
        let mut used = TokenCount::ZERO;
        for line in start..=end {
            let cost = estimate_tokens(lines[line - 1]) + TokenCount::new(1);
            if line > window_start && used + cost > self.max_chunk_tokens {
                out.push(self.window(path, name, lines, window_start, line - 1));
                window_start = line;
                used = TokenCount::ZERO;
            }
            used += cost;
        }
        out.push(self.window(path, name, lines, window_start, end));
    }

    fn window(
        &self,
        path: &FilePath,
        name: &str,
        lines: &[&str],
        start: usize,
        end: usize,
    ) -> CodeChunk {
        let content = lines[start - 1..end].join("\n");
        CodeChunk {
            source: path.clone(),
            symbol_name: name.to_string(),
            tokens: estimate_tokens(&content),
            content,
            line_range: (start, end),
        }
    }
}

/// Non-overlapping top-level symbol spans clamped to the file, in line order.
/// Nested symbols (methods inside a class) fold into their container.
fn top_level_spans(symbols: &[Symbol], line_count: usize) -> Vec<(&str, usize, usize)> {
    let mut sorted: Vec<&Symbol> = symbols
        .iter()
        .filter(|s| s.line_range.0 >= 1 && s.line_range.0 <= line_count)
        .collect();
    sorted.sort_by(|a, b| {
        a.line_range
            .0
            .cmp(&b.line_range.0)
            .then(b.line_range.1.cmp(&a.line_range.1))
    });

    let mut spans: Vec<(&str, usize, usize)> = Vec::new();
    for symbol in sorted {
        let start = symbol.line_range.0;
        let end = symbol.line_range.1.clamp(start, line_count);
        match spans.last() {
            Some(&(_, _, prev_end)) if start <= prev_end => continue,
            _ => spans.push((symbol.name.as_str(), start, end)),
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolKind;

    const SOURCE: &str = "import os
import sys

class Auth:
    def login(self, user):
        return user

def helper():
    return 1
";

    fn entry() -> FileEntry {
        FileEntry::new("src/auth/login.py").with_symbols(vec![
            Symbol::new("Auth", SymbolKind::Class, (4, 6)),
            Symbol::new("login", SymbolKind::Method, (5, 6)),
            Symbol::new("helper", SymbolKind::Function, (8, 9)),
        ])
    }

    #[test]
    fn chunks_follow_top_level_symbols() {
        let chunks = Chunker::default().chunk_file(&entry(), SOURCE);
        let names: Vec<&str> = chunks.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(names, vec![MODULE_CHUNK, "Auth", "helper"]);
        assert_eq!(chunks[0].line_range, (1, 2));
        assert_eq!(chunks[1].line_range, (4, 6));
        assert!(chunks[1].content.contains("def login"));
        assert_eq!(chunks[1].id(), "src/auth/login.py:4-6");
    }

    #[test]
    fn oversized_symbols_split_into_windows() {
        let body: Vec<String> = (0..40).map(|i| format!("    value_{i} = compute({i})")).collect();
        let content = format!("def big():\n{}\n", body.join("\n"));
        let file = FileEntry::new("big.py")
            .with_symbols(vec![Symbol::new("big", SymbolKind::Function, (1, 41))]);
        let limit = TokenCount::new(40);
        let chunks = Chunker::new(limit).chunk_file(&file, &content);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.symbol_name == "big"));
        assert_eq!(chunks.first().map(|c| c.line_range.0), Some(1));
        assert_eq!(chunks.last().map(|c| c.line_range.1), Some(41));
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].line_range.1 + 1, pair[1].line_range.0);
        }
    }

    #[test]
    fn file_without_symbols_is_one_module_chunk() {
        let file = FileEntry::new("config.py");
        let chunks = Chunker::default().chunk_file(&file, "A = 1\nB = 2\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_name, MODULE_CHUNK);
        assert!(Chunker::default().chunk_file(&file, "").is_empty());
    }

    #[test]
    fn symbol_ranges_past_eof_are_clamped() {
        let file = FileEntry::new("a.py")
            .with_symbols(vec![Symbol::new("f", SymbolKind::Function, (1, 99))]);
        let chunks = Chunker::default().chunk_file(&file, "def f():\n    pass\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_range, (1, 2));
    }
}
