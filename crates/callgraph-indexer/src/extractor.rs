//! Rust call extraction with tree-sitter
//!
//! Resolution is by name, not by type: a call is attributed to a declared
//! method only when the name (plus any `Type::`, `module::` or `self.`
//! qualifier) picks out exactly one candidate. Everything else is left out.
//!
//! A `fn` declared inside another function body is named after its enclosing
//! function, e.g. `Engine::run::retry`.

use std::path::PathBuf;

use anyhow::Context as _;
use callgraph_core::{Dependency, FileId, MethodId, MethodInfo, SourceExtractor, SymbolTable, Visibility};
use tree_sitter::Node;

use crate::parser_pool::{ParseRequest, ParseResult, ParserPool};

/// Declares `fn` items and resolves their calls.
pub struct RustExtractor {
    root: PathBuf,
    pool: ParserPool,
}

impl RustExtractor {
    pub fn new(root: impl Into<PathBuf>, pool: ParserPool) -> Self {
        RustExtractor {
            root: root.into(),
            pool,
        }
    }

    fn parse(&self, file: &FileId) -> anyhow::Result<ParseResult> {
        let path = self.root.join(file.path());
        let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = self.pool.parse_blocking(ParseRequest { content, path })?;
        if parsed.tree.root_node().has_error() {
            tracing::debug!("{} has syntax errors; extracting what parsed", file);
        }
        Ok(parsed)
    }
}

impl SourceExtractor for RustExtractor {
    fn declare(&self, file: &FileId) -> anyhow::Result<Vec<MethodInfo>> {
        let parsed = self.parse(file)?;
        let mut functions = Vec::new();
        collect_functions(parsed.tree.root_node(), parsed.source(), &Enclosing::default(), &mut functions);
        Ok(functions
            .iter()
            .map(|function| function.info(file, parsed.source()))
            .collect())
    }

    fn extract(&self, file: &FileId, symbols: &SymbolTable) -> anyhow::Result<Vec<Dependency>> {
        let parsed = self.parse(file)?;
        let source = parsed.source();
        let mut functions = Vec::new();
        collect_functions(parsed.tree.root_node(), source, &Enclosing::default(), &mut functions);

        let mut dependencies = Vec::new();
        for function in &functions {
            let Some(body) = function.node.child_by_field_name("body") else {
                continue;
            };
            let caller = MethodId::new(file, &function.qualified_name());
            let mut calls = Vec::new();
            collect_calls(body, source, &mut calls);
            for call in calls {
                let call = call.with_self(function.context.owner.as_deref());
                if let Some(callee) = resolve(&call, file, symbols) {
                    dependencies.push(Dependency::new(caller, callee));
                }
            }
        }
        dependencies.sort();
        dependencies.dedup();
        Ok(dependencies)
    }
}

/// Enclosing inline modules (or function path) and `impl`/`trait` type of an item.
#[derive(Debug, Clone, Default)]
struct Enclosing {
    modules: Vec<String>,
    owner: Option<String>,
}

struct Function<'tree> {
    node: Node<'tree>,
    name: String,
    context: Enclosing,
}

impl Function<'_> {
    fn path(&self) -> Vec<String> {
        let mut parts = self.context.modules.clone();
        parts.extend(self.context.owner.iter().cloned());
        parts.push(self.name.clone());
        parts
    }

    fn qualified_name(&self) -> String {
        self.path().join("::")
    }

    fn info(&self, file: &FileId, source: &[u8]) -> MethodInfo {
        let mut info = MethodInfo::new(file.clone(), self.qualified_name(), self.name.as_str())
            .with_visibility(visibility(self.node, source))
            .with_line(self.node.start_position().row as u32 + 1);
        info.owner = self.context.owner.clone();
        info
    }
}

fn text<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    node.utf8_text(source).ok()
}

fn collect_functions<'tree>(node: Node<'tree>, source: &[u8], context: &Enclosing, out: &mut Vec<Function<'tree>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_item" | "function_signature_item" => {
                let Some(name) = child.child_by_field_name("name").and_then(|n| text(n, source)) else {
                    continue;
                };
                let function = Function {
                    node: child,
                    name: name.to_string(),
                    context: context.clone(),
                };
                if let Some(body) = child.child_by_field_name("body") {
                    let nested = Enclosing {
                        modules: function.path(),
                        owner: None,
                    };
                    out.push(function);
                    collect_functions(body, source, &nested, out);
                } else {
                    out.push(function);
                }
            }
            "mod_item" => {
                let (Some(name), Some(body)) = (
                    child.child_by_field_name("name").and_then(|n| text(n, source)),
                    child.child_by_field_name("body"),
                ) else {
                    continue;
                };
                let mut inner = context.clone();
                inner.modules.push(name.to_string());
                inner.owner = None;
                collect_functions(body, source, &inner, out);
            }
            "impl_item" | "trait_item" => {
                let type_field = if child.kind() == "impl_item" { "type" } else { "name" };
                let (Some(owner), Some(body)) = (
                    child.child_by_field_name(type_field).and_then(|n| type_name(n, source)),
                    child.child_by_field_name("body"),
                ) else {
                    continue;
                };
                let mut inner = context.clone();
                inner.owner = Some(owner);
                collect_functions(body, source, &inner, out);
            }
            // items nested in blocks, `const` initializers and the like
            _ => collect_functions(child, source, context, out),
        }
    }
}

/// `Foo` for `Foo`, `Foo<T>`, `crate::x::Foo` and `&Foo`.
fn type_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "generic_type" => type_name(node.child_by_field_name("type")?, source),
        "scoped_type_identifier" => type_name(node.child_by_field_name("name")?, source),
        "reference_type" => type_name(node.child_by_field_name("type")?, source),
        _ => text(node, source).map(str::to_string),
    }
}

fn visibility(function: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = function.walk();
    let modifier = function
        .named_children(&mut cursor)
        .find(|child| child.kind() == "visibility_modifier")
        .and_then(|child| text(child, source));
    match modifier {
        Some("pub") => Visibility::Public,
        Some(_) => Visibility::Restricted,
        None => Visibility::Private,
    }
}

/// How a call names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallTarget {
    /// `foo()`
    Free(String),
    /// `Type::foo()`, `module::foo()`; `qualifier` is the last path segment.
    /// `anchored` when the path starts at `crate`, `self` or `super`.
    Path {
        qualifier: String,
        name: String,
        anchored: bool,
    },
    /// `receiver.foo()`; `on_self` when the receiver is `self`
    Method { name: String, on_self: bool },
}

impl CallTarget {
    /// Rewrite `Self::` and `self.` to the enclosing type.
    fn with_self(self, owner: Option<&str>) -> CallTarget {
        match (self, owner) {
            (CallTarget::Path { qualifier, name, .. }, Some(owner)) if qualifier == "Self" => CallTarget::Path {
                qualifier: owner.to_string(),
                name,
                anchored: false,
            },
            (CallTarget::Method { name, on_self: true }, Some(owner)) => CallTarget::Path {
                qualifier: owner.to_string(),
                name,
                anchored: false,
            },
            (call, _) => call,
        }
    }
}

/// Calls inside `node`, skipping nested function items.
fn collect_calls(node: Node<'_>, source: &[u8], out: &mut Vec<CallTarget>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "function_item" {
            continue;
        }
        if child.kind() == "call_expression" {
            if let Some(target) = child.child_by_field_name("function").and_then(|f| call_target(f, source)) {
                out.push(target);
            }
        }
        collect_calls(child, source, out);
    }
}

fn call_target(function: Node<'_>, source: &[u8]) -> Option<CallTarget> {
    match function.kind() {
        "identifier" => Some(CallTarget::Free(text(function, source)?.to_string())),
        "scoped_identifier" => {
            let name = text(function.child_by_field_name("name")?, source)?.to_string();
            let path = function.child_by_field_name("path")?;
            let path_text = text(path, source)?;
            let anchored = ["crate", "self", "super"]
                .iter()
                .any(|root| path_text.split("::").next() == Some(*root));
            let qualifier = match path.kind() {
                "generic_type" | "scoped_type_identifier" => type_name(path, source)?,
                _ => path_text.rsplit("::").next()?.to_string(),
            };
            Some(CallTarget::Path {
                qualifier,
                name,
                anchored,
            })
        }
        "field_expression" => {
            let name = text(function.child_by_field_name("field")?, source)?.to_string();
            let on_self = function
                .child_by_field_name("value")
                .is_some_and(|value| value.kind() == "self");
            Some(CallTarget::Method { name, on_self })
        }
        "generic_function" => call_target(function.child_by_field_name("function")?, source),
        _ => None,
    }
}

/// Pick the single declared method a call refers to.
fn resolve(call: &CallTarget, file: &FileId, symbols: &SymbolTable) -> Option<MethodId> {
    let name = match call {
        CallTarget::Free(name) | CallTarget::Path { name, .. } | CallTarget::Method { name, .. } => name,
    };
    let all: Vec<MethodInfo> = symbols
        .by_name(name)
        .into_iter()
        .filter_map(|id| symbols.lookup(id))
        .collect();

    match call {
        CallTarget::Free(_) => pick(all.iter().filter(|info| info.owner.is_none()), file),
        CallTarget::Method { .. } => pick(all.iter().filter(|info| info.owner.is_some()), file),
        CallTarget::Path {
            qualifier,
            name,
            anchored,
        } => {
            let suffix = format!("{}::{}", qualifier, name);
            let typed: Vec<&MethodInfo> = all
                .iter()
                .filter(|info| info.owner.as_deref() == Some(qualifier.as_str()) || info.qualified_name.ends_with(&suffix))
                .collect();
            if !typed.is_empty() || !is_module_name(qualifier) {
                return pick(typed.into_iter(), file);
            }

            // a file module: `util::helper()` for a `helper` declared in util.rs or util/mod.rs
            let free: Vec<&MethodInfo> = all.iter().filter(|info| info.owner.is_none()).collect();
            let in_module: Vec<&MethodInfo> = free
                .iter()
                .copied()
                .filter(|info| module_holds(qualifier, &info.file, file))
                .collect();
            match pick(in_module.into_iter(), file) {
                Some(id) => Some(id),
                None if *anchored => pick(free.into_iter(), file),
                None => None,
            }
        }
    }
}

/// The only local candidate, else the only candidate anywhere.
fn pick<'a>(candidates: impl Iterator<Item = &'a MethodInfo>, file: &FileId) -> Option<MethodId> {
    let candidates: Vec<&MethodInfo> = candidates.collect();
    let local: Vec<&&MethodInfo> = candidates.iter().filter(|info| &info.file == file).collect();
    match (local.as_slice(), candidates.as_slice()) {
        ([only], _) => Some(only.id),
        ([], [only]) => Some(only.id),
        _ => None,
    }
}

/// Modules are snake_case; `Type::` qualifiers never reach file lookup.
fn is_module_name(qualifier: &str) -> bool {
    qualifier.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
}

/// Whether `module` (a last path segment, or `crate`/`self`) names the file `candidate`.
fn module_holds(module: &str, candidate: &FileId, caller: &FileId) -> bool {
    let path = candidate.path();
    let stem = path.file_stem().and_then(|s| s.to_str());
    match module {
        "crate" => matches!(stem, Some("lib" | "main")),
        "self" => candidate == caller,
        "super" => false,
        _ => {
            stem == Some(module)
                || (stem == Some("mod")
                    && path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) == Some(module))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_rewrites_to_owner() {
        let call = CallTarget::Method {
            name: "step".to_string(),
            on_self: true,
        };
        assert_eq!(
            call.with_self(Some("Engine")),
            CallTarget::Path {
                qualifier: "Engine".to_string(),
                name: "step".to_string(),
                anchored: false,
            }
        );

        let free = CallTarget::Free("step".to_string());
        assert_eq!(free.clone().with_self(Some("Engine")), free);
    }

    #[test]
    fn test_resolution_prefers_local_then_unique_global() {
        let symbols = SymbolTable::new();
        let here = FileId::new("src/here.rs");
        let there = FileId::new("src/there.rs");
        let elsewhere = FileId::new("src/elsewhere.rs");
        let local = MethodInfo::new(here.clone(), "run", "run");
        let remote = MethodInfo::new(there.clone(), "run", "run");
        let unique = MethodInfo::new(there.clone(), "launch", "launch");
        for info in [&local, &remote, &unique] {
            symbols.insert(info.clone());
        }

        assert_eq!(resolve(&CallTarget::Free("run".into()), &here, &symbols), Some(local.id));
        assert_eq!(resolve(&CallTarget::Free("run".into()), &elsewhere, &symbols), None);
        assert_eq!(resolve(&CallTarget::Free("launch".into()), &here, &symbols), Some(unique.id));
        assert_eq!(resolve(&CallTarget::Free("missing".into()), &here, &symbols), None);
    }

    fn path(qualifier: &str, name: &str, anchored: bool) -> CallTarget {
        CallTarget::Path {
            qualifier: qualifier.to_string(),
            name: name.to_string(),
            anchored,
        }
    }

    #[test]
    fn test_module_paths_resolve_to_free_functions() {
        let symbols = SymbolTable::new();
        let lib = FileId::new("src/lib.rs");
        let net = FileId::new("src/net/mod.rs");
        let in_util = MethodInfo::new(FileId::new("src/util.rs"), "helper", "helper");
        let in_net = MethodInfo::new(net.clone(), "helper", "helper");
        let top = MethodInfo::new(lib.clone(), "top", "top");
        let mut method = MethodInfo::new(FileId::new("src/parse.rs"), "Parser::helper", "helper");
        method.owner = Some("Parser".to_string());
        for info in [&in_util, &in_net, &top, &method] {
            symbols.insert(info.clone());
        }

        assert_eq!(resolve(&path("util", "helper", false), &lib, &symbols), Some(in_util.id));
        assert_eq!(resolve(&path("util", "helper", true), &lib, &symbols), Some(in_util.id));
        assert_eq!(resolve(&path("net", "helper", false), &lib, &symbols), Some(in_net.id));
        assert_eq!(resolve(&path("self", "helper", true), &net, &symbols), Some(in_net.id));
        assert_eq!(resolve(&path("Parser", "helper", false), &lib, &symbols), Some(method.id));
        assert_eq!(resolve(&path("crate", "top", true), &net, &symbols), Some(top.id));
        assert_eq!(resolve(&path("super", "top", true), &net, &symbols), Some(top.id));

        // foreign modules and undeclared types stay unresolved
        assert_eq!(resolve(&path("mem", "helper", false), &lib, &symbols), None);
        assert_eq!(resolve(&path("Vec", "top", false), &lib, &symbols), None);
    }
}
