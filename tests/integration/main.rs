//! Integration tests for callgraph
//!
//! These run the real collaborators (filesystem walk, tree-sitter extraction,
//! layered layout) against a small project on disk, and the binary itself.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use callgraph_core::{
    AreaScope, BuildRequest, CallGraphBuilder, GraphDocument, NoProgress, clear_cache, load_store,
};
use callgraph_indexer::open_project;
use tempfile::TempDir;

const LIB: &str = r#"
pub fn run() {
    parse();
    render();
}

fn parse() {
    lex();
}

fn lex() {}

pub fn render() {}
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Cargo.toml", "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n");
    write(dir.path(), "src/lib.rs", LIB);
    write(dir.path(), "tests/smoke.rs", "#[test]\nfn smoke() {\n    run();\n}\n");
    dir
}

fn callgraph(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_callgraph"));
    command.arg("--root").arg(root);
    command
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_callgraph"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("callgraph"));
    assert!(stdout.contains("closure"));
}

#[test]
fn test_cli_build_writes_document_and_cache() {
    let dir = create_project();
    let out = dir.path().join("graph.json");

    let status = callgraph(dir.path())
        .args(["build", "--fit", "--output"])
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let document: GraphDocument = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(document.generation, 1);
    assert_eq!(document.nodes.len(), 4);
    assert_eq!(document.edges.len(), 3);
    for node in &document.nodes {
        assert!(node.position.x >= 0.1 - 1e-9 && node.position.x <= 0.9 + 1e-9);
        assert!(node.position.y >= 0.1 - 1e-9 && node.position.y <= 0.9 + 1e-9);
    }

    // the store also holds the test file's call
    let store = load_store(dir.path()).unwrap().expect("cache written");
    assert_eq!(store.dependency_count(), 4);
}

#[test]
fn test_cli_closure_prints_callers() {
    let dir = create_project();
    let output = callgraph(dir.path())
        .args(["closure", "lex", "--direction", "upstream"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().any(|l| l.contains("smoke") && l.contains("run")));
    assert!(lines.iter().any(|l| l.contains("run") && l.contains("parse")));
    assert!(lines.iter().any(|l| l.contains("parse") && l.contains("lex")));
}

#[test]
fn test_cli_clear_removes_cache() {
    let dir = create_project();
    assert!(callgraph(dir.path()).arg("build").output().unwrap().status.success());
    assert!(dir.path().join(".callgraph").exists());

    assert!(callgraph(dir.path()).arg("clear").status().unwrap().success());
    assert!(!dir.path().join(".callgraph").exists());
}

#[test]
fn test_cached_store_refreshes_only_changed_files() {
    let dir = create_project();
    write(dir.path(), "src/other.rs", "pub fn other() {\n    render();\n}\n");

    let builder = CallGraphBuilder::new(open_project(dir.path(), Arc::new(NoProgress)).unwrap());
    builder.refresh().unwrap();
    builder.save_cache(dir.path()).unwrap();
    assert_eq!(builder.last_report().reparsed, 3);

    let store = load_store(dir.path()).unwrap().unwrap();
    let builder = CallGraphBuilder::with_store(open_project(dir.path(), Arc::new(NoProgress)).unwrap(), store);
    builder.refresh().unwrap();
    let report = builder.last_report();
    assert_eq!(report.reparsed, 0);
    assert_eq!(report.dependencies, 5);

    write(dir.path(), "src/other.rs", "pub fn other() {\n    lex_twice();\n}\n\nfn lex_twice() {}\n");
    let dependencies = builder.refresh().unwrap();
    let report = builder.last_report();
    assert_eq!(report.changed_files, 1);
    // the callee side of the dropped `other -> render` call is re-extracted too
    assert_eq!(report.reparsed, 2);
    assert_eq!(dependencies.len(), 5);
    assert_eq!(builder.lookup_method("lex_twice").len(), 1);

    clear_cache(dir.path()).unwrap();
    assert!(load_store(dir.path()).unwrap().is_none());
}

#[tokio::test]
async fn test_server_state_over_real_project() {
    use callgraph_core::AtomicProgress;
    use callgraph_server::{CallgraphServer, ServerConfig, ServerState};

    let dir = create_project();
    let progress = Arc::new(AtomicProgress::new());
    let context = open_project(dir.path(), progress.clone()).unwrap();
    let state = ServerState::new(Arc::new(CallGraphBuilder::new(context)), progress).with_cache_root(dir.path());
    let server = CallgraphServer::new(
        state,
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    );

    let state = server.state();
    let outcome = state
        .run_build(BuildRequest::area(AreaScope::whole_project().with_tests(true)))
        .await
        .unwrap();
    let snapshot = outcome.snapshot().unwrap();
    assert_eq!(snapshot.graph.node_count(), 5);
    assert_eq!(snapshot.graph.edge_count(), 4);
    assert!(dir.path().join(".callgraph").join("dependencies.bin").exists());
}
