//! Unit tests for callgraph-indexer

use std::fs;
use std::path::Path;
use std::sync::Arc;

use callgraph_core::{
    AreaScope, BuildRequest, CallGraphBuilder, FileEnumerator, FileId, MethodId, NoProgress, SourceExtractor,
    SymbolTable, Visibility,
};
use tempfile::TempDir;

use crate::{FsProject, ParserPool, RustExtractor, open_project};

const ENGINE: &str = r#"
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Engine
    }

    pub fn run(&self) {
        self.step();
        helpers::log("run");
    }

    pub(crate) fn step(&self) {
        tick();
    }
}

fn tick() {}

mod helpers {
    pub fn log(message: &str) {
        let _ = message.len();
    }
}

pub fn start() {
    let engine = Engine::new();
    engine.run();
}
"#;

const APP: &str = r#"
fn main() {
    engine_start();
    println!("done");
}

fn engine_start() {
    start();
}
"#;

const SMOKE: &str = r#"
#[test]
fn smoke() {
    start();
}
"#;

const NESTED: &str = r#"
pub struct Engine;

impl Engine {
    pub fn run(&self) {
        fn retry() {
            tick();
        }
        retry();
    }
}

fn tick() {}
"#;

const LIB_WITH_MODULE: &str = r#"
mod util;

pub fn run() {
    util::helper();
    crate::util::helper();
    let mut buffer = vec![1];
    let _ = std::mem::take(&mut buffer);
}
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A two-crate workspace with a test file and build output.
fn create_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "Cargo.toml", "[workspace]\nmembers = [\"crates/*\"]\n");
    write(root, "crates/engine/Cargo.toml", "[package]\nname = \"engine\"\nversion = \"0.1.0\"\n");
    write(root, "crates/engine/src/lib.rs", ENGINE);
    write(root, "crates/app/Cargo.toml", "[package]\nname = \"app\"\nversion = \"0.1.0\"\n");
    write(root, "crates/app/src/main.rs", APP);
    write(root, "crates/app/tests/smoke.rs", SMOKE);
    write(root, "target/debug/build/out.rs", "fn generated() {}");
    dir
}

fn files(set: impl IntoIterator<Item = FileId>) -> Vec<String> {
    set.into_iter().map(|f| f.to_string()).collect()
}

#[test]
fn test_enumeration_skips_excluded_paths() {
    let dir = create_test_workspace();
    let project = FsProject::open(dir.path()).unwrap();

    assert_eq!(
        files(project.all_files().unwrap()),
        vec![
            "crates/app/src/main.rs",
            "crates/app/tests/smoke.rs",
            "crates/engine/src/lib.rs",
        ]
    );
}

#[test]
fn test_gitignore_is_respected() {
    let dir = create_test_workspace();
    write(dir.path(), ".gitignore", "crates/app/tests/\n");
    let project = FsProject::open(dir.path()).unwrap();

    assert!(
        !files(project.all_files().unwrap()).contains(&"crates/app/tests/smoke.rs".to_string())
    );
}

#[test]
fn test_modules_come_from_package_manifests() {
    let dir = create_test_workspace();
    let project = FsProject::open(dir.path()).unwrap();
    let modules = project.modules().unwrap();

    let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["app", "engine"]);
}

#[test]
fn test_files_in_scope() {
    let dir = create_test_workspace();
    let project = FsProject::open(dir.path()).unwrap();

    let engine = project.files_in_scope(&AreaScope::module("engine")).unwrap();
    assert_eq!(files(engine), vec!["crates/engine/src/lib.rs"]);

    let app = project.files_in_scope(&AreaScope::module("app")).unwrap();
    assert_eq!(files(app), vec!["crates/app/src/main.rs"]);

    let app_with_tests = project
        .files_in_scope(&AreaScope::module("app").with_tests(true))
        .unwrap();
    assert_eq!(app_with_tests.len(), 2);

    let dir_scope = project
        .files_in_scope(&AreaScope::directory("crates/app/src"))
        .unwrap();
    assert_eq!(files(dir_scope), vec!["crates/app/src/main.rs"]);

    assert!(project.files_in_scope(&AreaScope::module("missing")).is_err());
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = create_test_workspace();
    write(dir.path(), "callgraph.toml", "exclude = [\"crates/engine/**\", \"target/**\"]\n");
    let project = FsProject::open(dir.path()).unwrap();

    let all = files(project.all_files().unwrap());
    assert!(all.iter().all(|f| !f.starts_with("crates/engine")));
}

#[test]
fn test_timestamp_changes_with_content() {
    let dir = create_test_workspace();
    let project = FsProject::open(dir.path()).unwrap();
    let file = FileId::new("crates/app/src/main.rs");

    let before = project.timestamp(&file).unwrap();
    write(dir.path(), "crates/app/src/main.rs", &format!("{}\nfn extra() {{}}\n", APP));
    let after = project.timestamp(&file).unwrap();
    assert_ne!(before, after);

    assert!(project.timestamp(&FileId::new("crates/gone.rs")).is_err());
}

#[test]
fn test_declarations() {
    let dir = create_test_workspace();
    let extractor = RustExtractor::new(dir.path(), ParserPool::new(1));
    let methods = extractor
        .declare(&FileId::new("crates/engine/src/lib.rs"))
        .unwrap();

    let labels: Vec<String> = methods
        .iter()
        .map(|m| {
            let vis = match m.visibility {
                Visibility::Public => "pub",
                Visibility::Restricted => "pub(crate)",
                Visibility::Private => "priv",
            };
            format!("{} {} @{}", vis, m.qualified_name, m.line.unwrap_or(0))
        })
        .collect();
    insta::assert_json_snapshot!(labels, @r###"
    [
      "pub Engine::new @5",
      "pub Engine::run @9",
      "pub(crate) Engine::step @14",
      "priv tick @19",
      "pub helpers::log @22",
      "pub start @27"
    ]
    "###);
    assert_eq!(methods[0].owner.as_deref(), Some("Engine"));
    assert_eq!(methods[3].owner, None);
}

#[test]
fn test_extraction_resolves_calls() {
    let dir = create_test_workspace();
    let extractor = RustExtractor::new(dir.path(), ParserPool::new(2));
    let symbols = SymbolTable::new();
    let project = FsProject::open(dir.path()).unwrap();
    for file in project.all_files().unwrap() {
        for method in extractor.declare(&file).unwrap() {
            symbols.insert(method);
        }
    }

    let label = |id| symbols.lookup(id).map(|m| m.qualified_name).unwrap_or_default();
    let mut calls: Vec<String> = extractor
        .extract(&FileId::new("crates/engine/src/lib.rs"), &symbols)
        .unwrap()
        .into_iter()
        .map(|d| format!("{} -> {}", label(d.caller), label(d.callee)))
        .collect();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            "Engine::run -> Engine::step",
            "Engine::run -> helpers::log",
            "Engine::step -> tick",
            "start -> Engine::new",
            "start -> Engine::run",
        ]
    );

    let app = extractor
        .extract(&FileId::new("crates/app/src/main.rs"), &symbols)
        .unwrap();
    let cross: Vec<String> = app
        .into_iter()
        .map(|d| format!("{} -> {}", label(d.caller), label(d.callee)))
        .collect();
    assert!(cross.contains(&"engine_start -> start".to_string()));
    assert!(cross.contains(&"main -> engine_start".to_string()));
}

#[test]
fn test_end_to_end_build() {
    let dir = create_test_workspace();
    let context = open_project(dir.path(), Arc::new(NoProgress)).unwrap();
    let builder = CallGraphBuilder::new(context);

    let outcome = builder
        .build(&BuildRequest::area(AreaScope::whole_project().with_tests(true)))
        .unwrap();
    let snapshot = outcome.snapshot().unwrap();
    assert_eq!(snapshot.graph.node_count(), 9);
    assert_eq!(snapshot.graph.edge_count(), 8);

    let seeds = builder
        .lookup_method("start")
        .into_iter()
        .map(|m| m.id)
        .collect();
    let upstream = builder.upstream_closure(&seeds);
    assert_eq!(upstream.len(), 3);
}

#[test]
fn test_nested_functions_are_declared_and_keep_their_calls() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/lib.rs", NESTED);
    let extractor = RustExtractor::new(dir.path(), ParserPool::new(1));
    let file = FileId::new("src/lib.rs");

    let symbols = SymbolTable::new();
    let methods = extractor.declare(&file).unwrap();
    let names: Vec<&str> = methods.iter().map(|m| m.qualified_name.as_str()).collect();
    assert_eq!(names, vec!["Engine::run", "Engine::run::retry", "tick"]);
    assert_eq!(methods[1].owner, None);
    for method in methods {
        symbols.insert(method);
    }

    let label = |id| symbols.lookup(id).map(|m| m.qualified_name).unwrap_or_default();
    let mut calls: Vec<String> = extractor
        .extract(&file, &symbols)
        .unwrap()
        .into_iter()
        .map(|d| format!("{} -> {}", label(d.caller), label(d.callee)))
        .collect();
    calls.sort();
    assert_eq!(calls, vec!["Engine::run -> Engine::run::retry", "Engine::run::retry -> tick"]);
}

#[test]
fn test_module_path_calls_reach_file_modules() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Cargo.toml", "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n");
    write(dir.path(), "src/lib.rs", LIB_WITH_MODULE);
    write(dir.path(), "src/util.rs", "pub fn helper() {}\n\npub fn take() {}\n");
    let builder = CallGraphBuilder::new(open_project(dir.path(), Arc::new(NoProgress)).unwrap());

    let outcome = builder
        .build(&BuildRequest::area(AreaScope::whole_project()))
        .unwrap();
    let graph = &outcome.snapshot().unwrap().graph;
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.contains_edge(
        MethodId::new(&FileId::new("src/lib.rs"), "run"),
        MethodId::new(&FileId::new("src/util.rs"), "helper"),
    ));
}
