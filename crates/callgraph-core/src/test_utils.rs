//! Test utilities: an in-memory project implementing the collaborator traits

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};

use crate::build::ProjectContext;
use crate::cancel::CancellationToken;
use crate::graph::CallGraph;
use crate::layout::{Blueprint, LayoutError, LayoutOracle};
use crate::model::{Dependency, FileId, MethodId, MethodInfo, Stamp};
use crate::oracle::LayeredLayout;
use crate::progress::NoProgress;
use crate::source::{FileEnumerator, SourceExtractor};
use crate::symbols::SymbolTable;
use crate::view::{AreaKind, AreaScope};

#[derive(Debug, Clone, Default)]
struct FakeFile {
    stamp: Stamp,
    module: Option<String>,
    is_test: bool,
    broken: bool,
    /// Qualified names declared in the file
    methods: Vec<String>,
    /// `(caller, callee)` qualified names; callers are declared in this file
    calls: Vec<(String, String)>,
}

/// A project that lives in memory. Call targets resolve by qualified name
/// through the symbol table, like a real extractor would.
#[derive(Debug, Default)]
pub struct FakeProject {
    files: Mutex<BTreeMap<FileId, FakeFile>>,
    declare_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    extracted: Mutex<Vec<FileId>>,
}

impl FakeProject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file declaring `methods` and making `calls`.
    pub fn with_file(self, path: &str, methods: &[&str], calls: &[(&str, &str)]) -> Self {
        self.set_file(path, methods, calls);
        self
    }

    pub fn with_module(self, path: &str, module: &str) -> Self {
        self.edit(path, |file| file.module = Some(module.to_string()));
        self
    }

    pub fn with_test_file(self, path: &str) -> Self {
        self.edit(path, |file| file.is_test = true);
        self
    }

    pub fn set_file(&self, path: &str, methods: &[&str], calls: &[(&str, &str)]) {
        let mut files = self.lock_files();
        let file = files.entry(FileId::new(path)).or_default();
        file.stamp.modified_ns += 1;
        file.methods = methods.iter().map(|m| m.to_string()).collect();
        file.calls = calls
            .iter()
            .map(|(caller, callee)| (caller.to_string(), callee.to_string()))
            .collect();
    }

    /// Change the file's stamp without changing its content.
    pub fn touch(&self, path: &str) {
        self.edit(path, |file| file.stamp.modified_ns += 1);
    }

    pub fn remove(&self, path: &str) {
        self.lock_files().remove(&FileId::new(path));
    }

    /// Make declaration of the file fail until it is fixed.
    pub fn break_file(&self, path: &str, broken: bool) {
        self.edit(path, |file| {
            file.broken = broken;
            file.stamp.modified_ns += 1;
        });
    }

    pub fn id(path: &str, qualified_name: &str) -> MethodId {
        MethodId::new(&FileId::new(path), qualified_name)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn declare_calls(&self) -> usize {
        self.declare_calls.load(Ordering::SeqCst)
    }

    /// Files passed to `extract` since the last call, sorted.
    pub fn take_extracted(&self) -> Vec<FileId> {
        let mut extracted = std::mem::take(&mut *self.extracted.lock().unwrap());
        extracted.sort();
        extracted
    }

    /// Context wired to this project, the default oracle and no progress.
    pub fn context(self: &Arc<Self>) -> ProjectContext {
        ProjectContext {
            enumerator: self.clone(),
            extractor: self.clone(),
            oracle: Arc::new(LayeredLayout::new()),
            progress: Arc::new(NoProgress),
        }
    }

    fn edit(&self, path: &str, change: impl FnOnce(&mut FakeFile)) {
        let mut files = self.lock_files();
        let file = files.entry(FileId::new(path)).or_default();
        change(file);
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, BTreeMap<FileId, FakeFile>> {
        self.files.lock().unwrap()
    }

    fn file(&self, file: &FileId) -> anyhow::Result<FakeFile> {
        self.lock_files()
            .get(file)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", file))
    }
}

impl FileEnumerator for FakeProject {
    fn all_files(&self) -> anyhow::Result<BTreeSet<FileId>> {
        Ok(self.lock_files().keys().cloned().collect())
    }

    fn files_in_scope(&self, area: &AreaScope) -> anyhow::Result<BTreeSet<FileId>> {
        Ok(self
            .lock_files()
            .iter()
            .filter(|(_, file)| area.include_tests || !file.is_test)
            .filter(|(id, file)| match &area.kind {
                AreaKind::WholeProject => true,
                AreaKind::Module(name) => file.module.as_deref() == Some(name.as_str()),
                AreaKind::Directory(dir) => id.is_under(dir),
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn timestamp(&self, file: &FileId) -> anyhow::Result<Stamp> {
        Ok(self.file(file)?.stamp)
    }
}

impl SourceExtractor for FakeProject {
    fn declare(&self, file: &FileId) -> anyhow::Result<Vec<MethodInfo>> {
        self.declare_calls.fetch_add(1, Ordering::SeqCst);
        let fake = self.file(file)?;
        if fake.broken {
            bail!("cannot parse {}", file);
        }
        Ok(fake
            .methods
            .iter()
            .map(|qualified| {
                let name = qualified.rsplit("::").next().unwrap_or(qualified);
                MethodInfo::new(file.clone(), qualified.as_str(), name)
            })
            .collect())
    }

    fn extract(&self, file: &FileId, symbols: &SymbolTable) -> anyhow::Result<Vec<Dependency>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.extracted.lock().unwrap().push(file.clone());
        let fake = self.file(file)?;
        Ok(fake
            .calls
            .iter()
            .filter_map(|(caller, callee)| {
                let callee = symbols.find_by_qualified_name(callee).into_iter().next()?;
                Some(Dependency::new(MethodId::new(file, caller), callee))
            })
            .collect())
    }
}

/// Oracle that always fails.
#[derive(Debug, Default)]
pub struct UnavailableOracle;

impl LayoutOracle for UnavailableOracle {
    fn layout(&self, _component: &CallGraph, _cancel: &CancellationToken) -> Result<Blueprint, LayoutError> {
        Err(LayoutError::Unavailable("no layout engine".to_string()))
    }
}

/// Oracle that cancels the build's token the first time it runs, then defers to the default.
#[derive(Debug, Default)]
pub struct CancellingOracle;

impl LayoutOracle for CancellingOracle {
    fn layout(&self, component: &CallGraph, cancel: &CancellationToken) -> Result<Blueprint, LayoutError> {
        cancel.cancel();
        LayeredLayout::new().layout(component, cancel)
    }
}
