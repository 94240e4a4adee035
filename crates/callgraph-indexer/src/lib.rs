//! Default collaborators: filesystem enumeration and tree-sitter Rust extraction

pub mod config;
pub mod extractor;
pub mod parser_pool;
pub mod project;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use callgraph_core::{LayeredLayout, ProgressSink, ProjectContext};

pub use config::{CONFIG_FILE, ProjectConfig};
pub use extractor::RustExtractor;
pub use parser_pool::{ParseRequest, ParseResult, ParserPool, create_parser_pool};
pub use project::{FsProject, ModuleRoot};

/// Wire a project on disk to the Rust extractor and the layered layout.
///
/// Also sizes the global rayon pool from `workers`, unless it is already running.
pub fn open_project(root: &Path, progress: Arc<dyn ProgressSink>) -> anyhow::Result<ProjectContext> {
    let project = FsProject::open(root)?;
    let workers = project.config().worker_count();
    if rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .is_err()
    {
        tracing::debug!("Rayon pool already initialized");
    }

    let extractor = RustExtractor::new(project.root().to_path_buf(), ParserPool::new(workers));
    tracing::debug!("Opened project {} with {} workers", root.display(), workers);
    Ok(ProjectContext {
        enumerator: Arc::new(project),
        extractor: Arc::new(extractor),
        oracle: Arc::new(LayeredLayout::new()),
        progress,
    })
}
