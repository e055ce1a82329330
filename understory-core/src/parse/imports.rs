//! Resolve raw import specifiers to repository files
//!
//! Candidates are checked against the set of known repository paths. With no
//! known set only relative specifiers resolve, to their first candidate;
//! anything else is treated as an external dependency.

use super::Language;
use crate::model::FilePath;
use std::collections::HashSet;

pub(crate) struct Resolver<'a> {
    pub known: Option<&'a HashSet<String>>,
    pub go_module: Option<&'a str>,
}

impl Resolver<'_> {
    pub fn resolve(&self, language: Language, source: &FilePath, spec: &str) -> Option<FilePath> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        let resolved = match language {
            Language::Python => self.resolve_python(source, spec),
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                self.resolve_relative_js(source, spec)
            }
            Language::Go => self.resolve_go(spec),
            Language::Rust => self.resolve_rust(source, spec),
        }?;
        Some(FilePath::new(resolved))
    }

    fn is_known(&self, candidate: &str) -> bool {
        self.known.is_some_and(|known| known.contains(candidate))
    }

    /// First known candidate; with no known set, the first candidate when
    /// the specifier was relative.
    fn pick(&self, candidates: &[String], relative: bool) -> Option<String> {
        match self.known {
            Some(_) => candidates.iter().find(|c| self.is_known(c)).cloned(),
            None if relative => candidates.first().cloned(),
            None => None,
        }
    }

    fn resolve_python(&self, source: &FilePath, module: &str) -> Option<String> {
        if !module.starts_with('.') {
            let base = module.replace('.', "/");
            let candidates = [format!("{base}.py"), format!("{base}/__init__.py")];
            return self.pick(&candidates, false);
        }

        let levels = module.chars().take_while(|&c| c == '.').count();
        let suffix = &module[levels..];
        let mut dir = parent_dir(source.as_str()).to_string();
        for _ in 0..levels.saturating_sub(1) {
            dir = parent_dir(&dir).to_string();
        }
        if suffix.is_empty() {
            return self.pick(&[join_posix(&dir, "__init__.py")], true);
        }
        let base = join_posix(&dir, &suffix.replace('.', "/"));
        let candidates = [format!("{base}.py"), format!("{base}/__init__.py")];
        self.pick(&candidates, true)
    }

    fn resolve_relative_js(&self, source: &FilePath, spec: &str) -> Option<String> {
        if !spec.starts_with('.') {
            return None;
        }
        let base = normalize_posix_path(&join_posix(parent_dir(source.as_str()), spec));
        let mut candidates = vec![base.clone()];
        for ext in ["ts", "tsx", "js", "jsx", "mjs"] {
            candidates.push(format!("{base}.{ext}"));
        }
        for ext in ["ts", "tsx", "js", "jsx"] {
            candidates.push(format!("{base}/index.{ext}"));
        }
        match self.known {
            Some(_) => self.pick(&candidates, true),
            // The bare specifier rarely names a file; guess the sibling source
            // file using the importer's own extension.
            None => {
                let ext = source.extension().unwrap_or("js");
                if base.rsplit('/').next().is_some_and(|n| n.contains('.')) {
                    Some(base)
                } else {
                    Some(format!("{base}.{ext}"))
                }
            }
        }
    }

    /// Module-relative packages resolve to the first `.go` file directly
    /// inside the package directory.
    fn resolve_go(&self, spec: &str) -> Option<String> {
        let module = self.go_module?;
        let known = self.known?;
        let rel = spec.strip_prefix(module)?.trim_start_matches('/');
        let prefix = if rel.is_empty() {
            String::new()
        } else {
            format!("{rel}/")
        };
        let mut candidates: Vec<&String> = known
            .iter()
            .filter(|p| {
                p.strip_prefix(&prefix)
                    .is_some_and(|rest| rest.ends_with(".go") && !rest.contains('/'))
                    && !p.ends_with("_test.go")
            })
            .collect();
        candidates.sort();
        candidates.first().map(|s| s.to_string())
    }

    /// `crate::`, `self::` and `super::` paths, plus `mod:<name>` for
    /// out-of-line module declarations.
    fn resolve_rust(&self, source: &FilePath, spec: &str) -> Option<String> {
        let (src_root, module) = rust_module_path(source.as_str());

        if let Some(name) = spec.strip_prefix("mod:") {
            let dir = join_posix(&src_root, &module.join("/"));
            let candidates = [
                join_posix(&dir, &format!("{name}.rs")),
                join_posix(&dir, &format!("{name}/mod.rs")),
            ];
            return self.pick(&candidates, true);
        }

        // `a::b::{C, D}` and `a::b as c` both name `a::b`
        let spec = spec.split("::{").next().unwrap_or(spec);
        let spec = spec.split(" as ").next().unwrap_or(spec).trim();
        let mut parts = spec
            .split("::")
            .filter(|p| !p.is_empty() && *p != "*")
            .peekable();
        let mut segments: Vec<String> = match parts.next()? {
            "crate" => Vec::new(),
            "self" => module.clone(),
            "super" => {
                let mut m = module.clone();
                m.pop();
                while parts.peek() == Some(&"super") {
                    parts.next();
                    m.pop();
                }
                m
            }
            _ => return None,
        };
        segments.extend(parts.map(str::to_string));

        let mut candidates = Vec::new();
        for len in (1..=segments.len()).rev() {
            let joined = segments[..len].join("/");
            candidates.push(join_posix(&src_root, &format!("{joined}.rs")));
            candidates.push(join_posix(&src_root, &format!("{joined}/mod.rs")));
        }
        match self.known {
            Some(_) => self.pick(&candidates, true),
            None => None,
        }
    }
}

/// Source root (`.../src`) and module path of a Rust file.
fn rust_module_path(path: &str) -> (String, Vec<String>) {
    let (root, rel) = match path.rfind("src/") {
        Some(idx) if idx == 0 || path[..idx].ends_with('/') => {
            (path[..idx + 3].to_string(), &path[idx + 4..])
        }
        _ => (parent_dir(path).to_string(), path.rsplit('/').next().unwrap_or(path)),
    };
    let mut module: Vec<String> = rel.split('/').map(str::to_string).collect();
    if let Some(last) = module.pop() {
        let stem = last.strip_suffix(".rs").unwrap_or(&last);
        if !matches!(stem, "mod" | "lib" | "main") {
            module.push(stem.to_string());
        }
    }
    (root, module)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join_posix(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{dir}/{rest}"),
    }
}

pub(crate) fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}
