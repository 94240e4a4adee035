//! CLI command implementations

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use callgraph_core::{
    AreaScope, AtomicProgress, BuildOutcome, BuildRequest, CallGraphBuilder, ClosureDirection, LogProgress,
    MethodId, ProgressSink, Scope, load_meta, load_store,
};
use callgraph_indexer::open_project;
use callgraph_server::{CallgraphServer, ServerConfig, ServerState};

use crate::{AreaArg, BuildArgs, Towards};

/// Open the project at `root`, reusing the on-disk dependency cache when it is readable.
fn open_builder(root: &Path, progress: Arc<dyn ProgressSink>) -> anyhow::Result<CallGraphBuilder> {
    let context = open_project(root, progress)?;
    let store = match load_store(root) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Ignoring unreadable dependency cache: {}", e);
            None
        }
    };
    if store.is_some() {
        match load_meta(root) {
            Ok(Some(meta)) => tracing::info!(
                "Reusing dependency cache from {} ({} files, {} dependencies, v{})",
                meta.saved_at.to_rfc3339(),
                meta.files,
                meta.dependencies,
                meta.version
            ),
            Ok(None) => {}
            Err(e) => tracing::debug!("Ignoring unreadable cache metadata: {}", e),
        }
    }
    Ok(match store {
        Some(store) => CallGraphBuilder::with_store(context, store),
        None => CallGraphBuilder::new(context),
    })
}

fn resolve_methods(builder: &CallGraphBuilder, names: &[String]) -> anyhow::Result<BTreeSet<MethodId>> {
    let mut seeds = BTreeSet::new();
    for name in names {
        let found = builder.lookup_method(name);
        if found.is_empty() {
            bail!("no method named `{}`", name);
        }
        if found.len() > 1 {
            tracing::info!("`{}` matches {} methods; using all of them", name, found.len());
        }
        seeds.extend(found.into_iter().map(|m| m.id));
    }
    Ok(seeds)
}

impl BuildArgs {
    fn closure_direction(&self) -> Option<ClosureDirection> {
        if self.upstream {
            Some(ClosureDirection::Upstream)
        } else if self.downstream {
            Some(ClosureDirection::Downstream)
        } else if self.both {
            Some(ClosureDirection::Both)
        } else {
            None
        }
    }

    fn area(&self) -> anyhow::Result<AreaScope> {
        let area = match self.scope {
            AreaArg::Whole => AreaScope::whole_project(),
            AreaArg::Module => AreaScope::module(self.module.clone().context("--module is required")?),
            AreaArg::Directory => AreaScope::directory(self.dir.clone().context("--dir is required")?),
        };
        Ok(area.with_tests(self.include_tests).limited(self.limited))
    }
}

fn build_blocking(root: &Path, args: &BuildArgs) -> anyhow::Result<String> {
    let builder = open_builder(root, Arc::new(LogProgress::new()))?;

    let request = match args.closure_direction() {
        Some(direction) => {
            builder.refresh()?;
            BuildRequest::closure(direction, resolve_methods(&builder, &args.method)?)
        }
        None => BuildRequest::area(args.area()?),
    };

    let snapshot = match builder.build(&request)? {
        BuildOutcome::Completed(snapshot) => snapshot,
        BuildOutcome::Cancelled => bail!("build was cancelled"),
    };
    tracing::info!(
        "Built {} methods and {} calls",
        snapshot.graph.node_count(),
        snapshot.graph.edge_count()
    );

    match builder.save_cache(root) {
        Ok(meta) => tracing::debug!("Cached {} dependencies", meta.dependencies),
        Err(e) => tracing::warn!("Failed to save dependency cache: {}", e),
    }

    Ok(serde_json::to_string_pretty(&snapshot.to_document(args.fit))?)
}

pub async fn build(root: PathBuf, args: BuildArgs) -> anyhow::Result<()> {
    let output = args.output.clone();
    let json = tokio::task::spawn_blocking(move || build_blocking(&root, &args)).await??;
    match output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn closure_blocking(root: &Path, method: &str, direction: Towards) -> anyhow::Result<Vec<(String, String)>> {
    let builder = open_builder(root, Arc::new(LogProgress::new()))?;
    builder.refresh()?;
    let seeds = resolve_methods(&builder, &[method.to_string()])?;

    let mut dependencies: Vec<_> = match direction {
        Towards::Upstream => builder.upstream_closure(&seeds).into_iter().collect(),
        Towards::Downstream => builder.downstream_closure(&seeds).into_iter().collect(),
        Towards::Both => builder
            .upstream_closure(&seeds)
            .into_iter()
            .chain(builder.downstream_closure(&seeds))
            .collect(),
    };
    dependencies.sort();
    dependencies.dedup();

    if let Err(e) = builder.save_cache(root) {
        tracing::warn!("Failed to save dependency cache: {}", e);
    }

    let label = |id: MethodId| builder.method(id).map_or_else(|| id.to_string(), |m| m.signature());
    let mut edges: Vec<(String, String)> = dependencies
        .into_iter()
        .map(|d| (label(d.caller), label(d.callee)))
        .collect();
    edges.sort();
    Ok(edges)
}

pub async fn closure(root: PathBuf, method: String, direction: Towards) -> anyhow::Result<()> {
    let edges = tokio::task::spawn_blocking(move || closure_blocking(&root, &method, direction)).await??;
    for (caller, callee) in edges {
        println!("{} -> {}", caller, callee);
    }
    Ok(())
}

pub async fn serve(root: PathBuf, host: String, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting callgraph server on {}:{}", host, port);

    let progress = Arc::new(AtomicProgress::new());
    let builder = {
        let root = root.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || open_builder(&root, progress)).await??
    };
    let state = ServerState::new(Arc::new(builder), progress).with_cache_root(root);
    let server = CallgraphServer::new(state, ServerConfig { host, port });

    let state = server.state();
    tokio::spawn(async move {
        let request = BuildRequest {
            scope: Scope::Area(AreaScope::whole_project()),
            seeds: BTreeSet::new(),
        };
        match state.run_build(request).await {
            Ok(BuildOutcome::Completed(snapshot)) => tracing::info!(
                "Initial graph: {} methods, {} calls",
                snapshot.graph.node_count(),
                snapshot.graph.edge_count()
            ),
            Ok(BuildOutcome::Cancelled) => tracing::debug!("Initial build superseded"),
            Err(e) => tracing::error!("Initial build failed: {}", e),
        }
    });

    server.start().await
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    callgraph_core::clear_cache(&root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
