//! Collaborator contracts for reading a project's sources

use std::collections::BTreeSet;

use crate::model::{Dependency, FileId, FileSnapshot, MethodInfo, Stamp};
use crate::symbols::SymbolTable;
use crate::view::AreaScope;

/// Extracts declarations and call edges from one source file.
///
/// Extraction is two-phase: `declare` for every file that needs it, then
/// `extract` with a symbol table covering the whole project. Calls that
/// cannot be resolved are omitted, never reported as errors.
pub trait SourceExtractor: Send + Sync {
    fn declare(&self, file: &FileId) -> anyhow::Result<Vec<MethodInfo>>;

    fn extract(&self, file: &FileId, symbols: &SymbolTable) -> anyhow::Result<Vec<Dependency>>;
}

/// Lists the project's source files and their change stamps.
pub trait FileEnumerator: Send + Sync {
    fn all_files(&self) -> anyhow::Result<BTreeSet<FileId>>;

    fn files_in_scope(&self, area: &AreaScope) -> anyhow::Result<BTreeSet<FileId>>;

    fn timestamp(&self, file: &FileId) -> anyhow::Result<Stamp>;

    /// Stamp every file. Files that vanished since enumeration are skipped.
    fn snapshot(&self) -> anyhow::Result<Vec<FileSnapshot>> {
        let files = self.all_files()?;
        let mut snapshots = Vec::with_capacity(files.len());
        for file in files {
            match self.timestamp(&file) {
                Ok(stamp) => snapshots.push(FileSnapshot { file, stamp }),
                Err(err) => tracing::warn!("Skipping {}: {:#}", file, err),
            }
        }
        Ok(snapshots)
    }
}
