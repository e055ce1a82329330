//! Tree-sitter backed parser for Rust, Python, JavaScript, TypeScript and Go

use super::imports::Resolver;
use super::{Language, Parser};
use crate::error::UnderstoryError;
use crate::model::{FileEntry, FilePath, Symbol, SymbolKind};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tree_sitter::Node;

/// Parses source files and resolves their imports against the repository.
///
/// Resolution is only as good as the known-file set: without one, only
/// relative imports produce edges.
#[derive(Debug, Clone, Default)]
pub struct TreeSitterParser {
    known_files: Option<Arc<HashSet<String>>>,
    go_module: Option<String>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = FilePath>,
    {
        let set: HashSet<String> = files.into_iter().map(|f| f.as_str().to_string()).collect();
        self.known_files = Some(Arc::new(set));
        self
    }

    /// Module path from `go.mod`, used to resolve in-repo Go packages.
    pub fn with_go_module(mut self, module: impl Into<String>) -> Self {
        self.go_module = Some(module.into());
        self
    }

    /// Module path declared by a `go.mod` file.
    pub fn go_module_from(go_mod: &str) -> Option<String> {
        go_mod
            .lines()
            .find_map(|line| line.trim().strip_prefix("module "))
            .map(|m| m.trim().to_string())
    }
}

impl Parser for TreeSitterParser {
    fn parse(&self, path: &FilePath, content: &str) -> Result<FileEntry> {
        let language = Language::from_path(path)
            .ok_or_else(|| UnderstoryError::parse(path.as_str(), "unsupported file type"))?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language.grammar())
            .map_err(|e| UnderstoryError::parse(path.as_str(), e))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| UnderstoryError::parse(path.as_str(), "parser produced no tree"))?;

        let mut out = Extraction::default();
        walk(&tree.root_node(), content, language, &Ctx::default(), &mut out);

        let resolver = Resolver {
            known: self.known_files.as_deref(),
            go_module: self.go_module.as_deref(),
        };
        let mut imports: Vec<FilePath> = Vec::new();
        for spec in &out.imports {
            if let Some(target) = resolver.resolve(language, path, spec) {
                if target != *path && !imports.contains(&target) {
                    imports.push(target);
                }
            }
        }

        let mut exports = out.exports;
        exports.dedup();

        Ok(FileEntry::new(path.clone())
            .with_symbols(out.symbols)
            .with_imports(imports)
            .with_exports(exports))
    }
}

#[derive(Default)]
struct Extraction {
    symbols: Vec<Symbol>,
    /// Raw specifiers, unresolved
    imports: Vec<String>,
    exports: Vec<String>,
}

/// Context passed down during traversal
#[derive(Clone, Default)]
struct Ctx {
    /// Enclosing class, impl or trait
    container: Option<String>,
    in_function: bool,
    exported: bool,
}

impl Ctx {
    fn top_level(&self) -> bool {
        self.container.is_none() && !self.in_function
    }

    fn nested_in(&self, container: String) -> Self {
        Self {
            container: Some(container),
            ..self.clone()
        }
    }

    fn inside_function(&self) -> Self {
        Self {
            container: None,
            in_function: true,
            exported: false,
        }
    }
}

fn walk(node: &Node, source: &str, language: Language, ctx: &Ctx, out: &mut Extraction) {
    let child_ctx = match language {
        Language::Rust => visit_rust(node, source, ctx, out),
        Language::Python => visit_python(node, source, ctx, out),
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            visit_js(node, source, ctx, out)
        }
        Language::Go => visit_go(node, source, ctx, out),
    };
    let ctx = child_ctx.as_ref().unwrap_or(ctx);

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(&child, source, language, ctx, out);
        }
    }
}

fn visit_rust(node: &Node, source: &str, ctx: &Ctx, out: &mut Extraction) -> Option<Ctx> {
    let is_pub = || find_child_by_kind(node, "visibility_modifier").is_some();
    match node.kind() {
        "function_item" => {
            let name = field_text(node, "name", source)?;
            let kind = if ctx.container.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            let sig = signature(node, source, "parameters", "return_type", " -> ");
            if ctx.top_level() && is_pub() {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name, kind, sig);
            Some(ctx.inside_function())
        }
        "struct_item" | "enum_item" | "union_item" => {
            let name = field_text(node, "name", source)?;
            if ctx.top_level() && is_pub() {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name, SymbolKind::Struct, None);
            None
        }
        "trait_item" => {
            let name = field_text(node, "name", source)?;
            if ctx.top_level() && is_pub() {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name.clone(), SymbolKind::Trait, None);
            Some(ctx.nested_in(name))
        }
        "impl_item" => {
            // impl<T> Foo<T> is named after Foo
            let ty = node.child_by_field_name("type")?;
            let name = if ty.kind() == "generic_type" {
                ty.child_by_field_name("type")
                    .map(|inner| node_text(&inner, source))
                    .unwrap_or_else(|| node_text(&ty, source))
            } else {
                node_text(&ty, source)
            };
            Some(ctx.nested_in(name.to_string()))
        }
        "mod_item" => {
            let name = field_text(node, "name", source)?;
            if node.child_by_field_name("body").is_none() {
                out.imports.push(format!("mod:{name}"));
            }
            push_symbol(out, node, name, SymbolKind::Module, None);
            None
        }
        "use_declaration" => {
            if let Some(arg) = node.child_by_field_name("argument") {
                out.imports.push(node_text(&arg, source).to_string());
            }
            None
        }
        _ => None,
    }
}

fn visit_python(node: &Node, source: &str, ctx: &Ctx, out: &mut Extraction) -> Option<Ctx> {
    match node.kind() {
        "function_definition" => {
            let name = field_text(node, "name", source)?;
            let kind = if ctx.container.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            let sig = signature(node, source, "parameters", "return_type", " -> ");
            if ctx.top_level() && !name.starts_with('_') {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name, kind, sig);
            Some(ctx.inside_function())
        }
        "class_definition" => {
            let name = field_text(node, "name", source)?;
            if ctx.top_level() && !name.starts_with('_') {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name.clone(), SymbolKind::Class, None);
            Some(ctx.nested_in(name))
        }
        "import_statement" => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    if let Some(module) = python_import_name(&child, source) {
                        out.imports.push(module);
                    }
                }
            }
            None
        }
        "import_from_statement" => {
            let module = field_text(node, "module_name", source)?;
            let mut cursor = node.walk();
            for name_node in node.children_by_field_name("name", &mut cursor) {
                // `from pkg import mod` may name a submodule
                if let Some(name) = python_import_name(&name_node, source) {
                    if module.ends_with('.') {
                        out.imports.push(format!("{module}{name}"));
                    } else {
                        out.imports.push(format!("{module}.{name}"));
                    }
                }
            }
            out.imports.push(module);
            None
        }
        _ => None,
    }
}

fn python_import_name(node: &Node, source: &str) -> Option<String> {
    match node.kind() {
        "dotted_name" => Some(node_text(node, source).to_string()),
        "aliased_import" => field_text(node, "name", source),
        _ => None,
    }
}

fn visit_js(node: &Node, source: &str, ctx: &Ctx, out: &mut Extraction) -> Option<Ctx> {
    let mut export = |out: &mut Extraction, name: &str| {
        if ctx.exported && ctx.container.is_none() {
            out.exports.push(name.to_string());
        }
    };
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let name = field_text(node, "name", source)?;
            let sig = signature(node, source, "parameters", "return_type", "");
            export(out, &name);
            push_symbol(out, node, name, SymbolKind::Function, sig);
            Some(ctx.inside_function())
        }
        "class_declaration" | "abstract_class_declaration" => {
            let name = field_text(node, "name", source)?;
            export(out, &name);
            push_symbol(out, node, name.clone(), SymbolKind::Class, None);
            Some(Ctx {
                container: Some(name),
                in_function: false,
                exported: false,
            })
        }
        "method_definition" => {
            let name = field_text(node, "name", source)?;
            let sig = signature(node, source, "parameters", "return_type", "");
            push_symbol(out, node, name, SymbolKind::Method, sig);
            Some(ctx.inside_function())
        }
        "interface_declaration" => {
            let name = field_text(node, "name", source)?;
            export(out, &name);
            push_symbol(out, node, name, SymbolKind::Interface, None);
            None
        }
        "type_alias_declaration" => {
            let name = field_text(node, "name", source)?;
            export(out, &name);
            push_symbol(out, node, name, SymbolKind::Other, None);
            None
        }
        "variable_declarator" if ctx.top_level() => {
            let value = node.child_by_field_name("value")?;
            if !matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function"
            ) {
                return None;
            }
            let name = field_text(node, "name", source)?;
            let sig = signature(&value, source, "parameters", "return_type", "");
            export(out, &name);
            push_symbol(out, node, name, SymbolKind::Function, sig);
            Some(ctx.inside_function())
        }
        "import_statement" => {
            if let Some(spec) = field_text(node, "source", source) {
                out.imports.push(unquote(&spec));
            }
            None
        }
        "export_statement" => {
            // `export { x } from './y'` re-exports
            if let Some(spec) = field_text(node, "source", source) {
                out.imports.push(unquote(&spec));
            }
            Some(Ctx {
                exported: true,
                ..ctx.clone()
            })
        }
        "call_expression" => {
            let callee = node.child_by_field_name("function")?;
            if node_text(&callee, source) == "require" {
                let arg = node.child_by_field_name("arguments")?.named_child(0)?;
                if arg.kind() == "string" {
                    out.imports.push(unquote(node_text(&arg, source)));
                }
            }
            None
        }
        _ => None,
    }
}

fn visit_go(node: &Node, source: &str, ctx: &Ctx, out: &mut Extraction) -> Option<Ctx> {
    let exported = |name: &str| name.chars().next().is_some_and(char::is_uppercase);
    match node.kind() {
        "function_declaration" => {
            let name = field_text(node, "name", source)?;
            let sig = signature(node, source, "parameters", "result", " ");
            if exported(&name) {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name, SymbolKind::Function, sig);
            Some(ctx.inside_function())
        }
        "method_declaration" => {
            let name = field_text(node, "name", source)?;
            let sig = signature(node, source, "parameters", "result", " ");
            push_symbol(out, node, name, SymbolKind::Method, sig);
            let receiver = go_receiver_type(node, source);
            Some(Ctx {
                container: receiver,
                in_function: true,
                exported: false,
            })
        }
        "type_spec" if !ctx.in_function => {
            let name = field_text(node, "name", source)?;
            let kind = match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Struct,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::Other,
            };
            if exported(&name) {
                out.exports.push(name.clone());
            }
            push_symbol(out, node, name, kind, None);
            None
        }
        "import_spec" => {
            if let Some(path) = field_text(node, "path", source) {
                out.imports.push(unquote(&path));
            }
            None
        }
        _ => None,
    }
}

/// Receiver type of a Go method, without the pointer.
fn go_receiver_type(node: &Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let param = receiver.named_child(0)?;
    let ty = param.child_by_field_name("type")?;
    if ty.kind() == "pointer_type" {
        ty.named_child(0).map(|inner| node_text(&inner, source).to_string())
    } else {
        Some(node_text(&ty, source).to_string())
    }
}

fn push_symbol(
    out: &mut Extraction,
    node: &Node,
    name: String,
    kind: SymbolKind,
    sig: Option<String>,
) {
    let line_range = (node.start_position().row + 1, node.end_position().row + 1);
    let mut symbol = Symbol::new(name, kind, line_range);
    symbol.signature = sig;
    out.symbols.push(symbol);
}

/// Parameter list plus return type, whitespace collapsed to one line.
fn signature(
    node: &Node,
    source: &str,
    params_field: &str,
    return_field: &str,
    return_sep: &str,
) -> Option<String> {
    let params = field_text(node, params_field, source)?;
    let mut sig = params.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(ret) = field_text(node, return_field, source) {
        sig.push_str(return_sep);
        sig.push_str(&ret.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    Some(sig)
}

fn find_child_by_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find(|child| child.kind() == kind)
}

fn field_text(node: &Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(&n, source).to_string())
        .filter(|s| !s.is_empty())
}

fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}
