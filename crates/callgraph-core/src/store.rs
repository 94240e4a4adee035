//! Incremental dependency cache keyed by file change stamps

use std::collections::{BTreeSet, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::model::{Dependency, DependencyOrigin, FileId, FileSnapshot, MethodInfo, Stamp};
use crate::progress::ProgressSink;
use crate::source::SourceExtractor;
use crate::symbols::SymbolTable;

/// What a refresh touched. Logged after every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub new_files: usize,
    pub changed_files: usize,
    pub removed_files: usize,
    pub invalidated: usize,
    pub reparsed: usize,
    pub failed: usize,
    pub dependencies: usize,
}

/// Call edges extracted so far, plus what is needed to invalidate them file by file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DependencyStore {
    file_timestamps: HashMap<FileId, Stamp>,
    dependencies: HashMap<Dependency, DependencyOrigin>,
    file_methods: HashMap<FileId, Vec<MethodInfo>>,
    #[serde(skip)]
    symbols: SymbolTable,
    #[serde(skip)]
    last_report: RefreshReport,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the store up to date with `all_files` and return the full dependency set.
    ///
    /// Only new files, changed files and the origin files of invalidated
    /// dependencies are re-extracted. The store is replaced in one step at the
    /// end; on cancellation it is left exactly as it was.
    pub fn refresh(
        &mut self,
        all_files: &[FileSnapshot],
        extractor: &dyn SourceExtractor,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<HashSet<Dependency>, BuildError> {
        let current: HashMap<&FileId, Stamp> = all_files.iter().map(|s| (&s.file, s.stamp)).collect();

        let mut report = RefreshReport::default();
        let mut stale: HashSet<FileId> = HashSet::new();
        let mut to_reparse: BTreeSet<FileId> = BTreeSet::new();

        for (&file, stamp) in &current {
            match self.file_timestamps.get(file) {
                None => {
                    report.new_files += 1;
                    to_reparse.insert(file.clone());
                }
                Some(previous) if previous != stamp => {
                    report.changed_files += 1;
                    stale.insert(file.clone());
                    to_reparse.insert(file.clone());
                }
                Some(_) => {}
            }
        }
        let removed: HashSet<FileId> = self
            .file_timestamps
            .keys()
            .filter(|file| !current.contains_key(file))
            .cloned()
            .collect();
        report.removed_files = removed.len();
        stale.extend(removed.iter().cloned());

        let mut valid: HashMap<Dependency, DependencyOrigin> = HashMap::with_capacity(self.dependencies.len());
        for (dependency, origin) in &self.dependencies {
            if stale.contains(&origin.caller_file) || stale.contains(&origin.callee_file) {
                report.invalidated += 1;
                to_reparse.insert(origin.caller_file.clone());
                to_reparse.insert(origin.callee_file.clone());
            } else {
                valid.insert(*dependency, origin.clone());
            }
        }
        to_reparse.retain(|file| current.contains_key(file));
        report.reparsed = to_reparse.len();

        debug!(
            "Refresh plan: {} new, {} changed, {} removed, {} to reparse",
            report.new_files,
            report.changed_files,
            report.removed_files,
            to_reparse.len()
        );

        // Phase 1: declarations. Each file is two units of progress.
        let to_reparse: Vec<FileId> = to_reparse.into_iter().collect();
        progress.begin(2 * to_reparse.len());
        let declared: Vec<(FileId, anyhow::Result<Vec<MethodInfo>>)> = to_reparse
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = extractor.declare(file);
                progress.increment();
                Some((file.clone(), result))
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(BuildError::Cancelled)?;

        let mut file_methods: HashMap<FileId, Vec<MethodInfo>> = self
            .file_methods
            .iter()
            .filter(|(file, _)| current.contains_key(file))
            .map(|(file, methods)| (file.clone(), methods.clone()))
            .collect();
        let mut failed: HashSet<FileId> = HashSet::new();
        let mut to_extract: Vec<FileId> = Vec::with_capacity(declared.len());
        for (file, result) in declared {
            match result {
                Ok(methods) => {
                    file_methods.insert(file.clone(), methods);
                    to_extract.push(file);
                }
                Err(err) => {
                    warn!("Skipping {}: {:#}", file, err);
                    file_methods.remove(&file);
                    failed.insert(file);
                    // no extraction pass for this file
                    progress.increment();
                }
            }
        }

        let symbols = SymbolTable::new();
        for methods in file_methods.values() {
            for method in methods {
                symbols.insert(method.clone());
            }
        }

        // Phase 2: call edges
        let extracted: Vec<(FileId, anyhow::Result<Vec<Dependency>>)> = to_extract
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = extractor.extract(file, &symbols);
                progress.increment();
                Some((file.clone(), result))
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(BuildError::Cancelled)?;
        cancel.check()?;

        let mut dependencies = valid;
        for (file, result) in extracted {
            let found = match result {
                Ok(found) => found,
                Err(err) => {
                    warn!("Skipping {}: {:#}", file, err);
                    failed.insert(file);
                    continue;
                }
            };
            for dependency in found {
                let origin = symbols
                    .file_of(dependency.caller)
                    .zip(symbols.file_of(dependency.callee))
                    .map(|(caller_file, callee_file)| DependencyOrigin {
                        caller_file,
                        callee_file,
                    });
                match origin {
                    Some(origin) => {
                        dependencies.insert(dependency, origin);
                    }
                    None => debug!("Dropping unlocated dependency {:?} from {}", dependency, file),
                }
            }
        }

        report.failed = failed.len();
        report.dependencies = dependencies.len();
        info!(
            "Dependencies refreshed: {} files reparsed, {} invalidated, {} total",
            report.reparsed, report.invalidated, report.dependencies
        );

        self.file_timestamps = current
            .into_iter()
            .filter(|(file, _)| !failed.contains(*file))
            .map(|(file, stamp)| (file.clone(), stamp))
            .collect();
        self.dependencies = dependencies;
        self.file_methods = file_methods;
        self.symbols = symbols;
        self.last_report = report;

        Ok(self.dependencies.keys().copied().collect())
    }

    /// The current dependency set.
    pub fn dependencies(&self) -> HashSet<Dependency> {
        self.dependencies.keys().copied().collect()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Number of files with an up-to-date cache entry.
    pub fn file_count(&self) -> usize {
        self.file_timestamps.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub fn method_count(&self) -> usize {
        self.file_methods.values().map(Vec::len).sum()
    }

    pub fn last_report(&self) -> &RefreshReport {
        &self.last_report
    }

    /// Forget everything; the next refresh re-extracts every file.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Recreate the symbol table from cached declarations (after deserialization).
    pub fn rebuild_symbols(&mut self) {
        let symbols = SymbolTable::new();
        for method in self.file_methods.values().flatten() {
            symbols.insert(method.clone());
        }
        self.symbols = symbols;
    }
}
