//! Filesystem project: source enumeration, module discovery and change stamps

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, bail};
use callgraph_core::{AreaKind, AreaScope, FileEnumerator, FileId, Stamp};
use globset::GlobSet;
use ignore::WalkBuilder;
use serde::Deserialize;

use crate::config::ProjectConfig;

/// A crate found under the project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleRoot {
    pub name: String,
    /// Directory holding the manifest, relative to the project root.
    pub dir: PathBuf,
}

#[derive(Deserialize)]
struct Manifest {
    package: Option<Package>,
}

#[derive(Deserialize)]
struct Package {
    name: String,
}

/// A Rust project on disk.
#[derive(Debug)]
pub struct FsProject {
    root: PathBuf,
    config: ProjectConfig,
    exclude: GlobSet,
    tests: GlobSet,
}

impl FsProject {
    /// Open `root`, reading `callgraph.toml` if present.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let config = ProjectConfig::load(&root)?;
        Self::with_config(root, config)
    }

    pub fn with_config(root: impl Into<PathBuf>, config: ProjectConfig) -> anyhow::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("project root {} is not a directory", root.display());
        }
        Ok(FsProject {
            exclude: config.exclude_set()?,
            tests: config.test_set()?,
            root,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn is_test(&self, file: &FileId) -> bool {
        self.tests.is_match(file.path())
    }

    /// Every directory with a `Cargo.toml` that declares a `[package]`.
    pub fn modules(&self) -> anyhow::Result<Vec<ModuleRoot>> {
        let mut modules = Vec::new();
        for relative in self.walk(|path| path.file_name().is_some_and(|n| n == "Cargo.toml")) {
            let path = self.root.join(&relative);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: Manifest = match toml::from_str(&text) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::warn!("Ignoring unreadable manifest {}: {}", path.display(), err);
                    continue;
                }
            };
            if let Some(package) = manifest.package {
                modules.push(ModuleRoot {
                    name: package.name,
                    dir: relative.parent().map(Path::to_path_buf).unwrap_or_default(),
                });
            }
        }
        modules.sort();
        Ok(modules)
    }

    /// The module owning `file`: the one with the deepest directory containing it.
    pub fn module_of<'a>(&self, file: &FileId, modules: &'a [ModuleRoot]) -> Option<&'a ModuleRoot> {
        modules
            .iter()
            .filter(|module| file.is_under(&module.dir))
            .max_by_key(|module| module.dir.components().count())
    }

    /// Relative paths of non-excluded files matching `keep`.
    fn walk(&self, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!("Walk error: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) || !keep(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if self.exclude.is_match(relative) {
                continue;
            }
            files.push(relative.to_path_buf());
        }
        files
    }
}

impl FileEnumerator for FsProject {
    fn all_files(&self) -> anyhow::Result<BTreeSet<FileId>> {
        Ok(self
            .walk(|path| path.extension().is_some_and(|ext| ext == "rs"))
            .into_iter()
            .map(FileId::new)
            .collect())
    }

    fn files_in_scope(&self, area: &AreaScope) -> anyhow::Result<BTreeSet<FileId>> {
        let files = self
            .all_files()?
            .into_iter()
            .filter(|file| area.include_tests || !self.is_test(file));

        match &area.kind {
            AreaKind::WholeProject => Ok(files.collect()),
            AreaKind::Directory(dir) => Ok(files.filter(|file| file.is_under(dir)).collect()),
            AreaKind::Module(name) => {
                let modules = self.modules()?;
                if !modules.iter().any(|module| &module.name == name) {
                    bail!("no module named `{}` under {}", name, self.root.display());
                }
                Ok(files
                    .filter(|file| self.module_of(file, &modules).is_some_and(|m| &m.name == name))
                    .collect())
            }
        }
    }

    fn timestamp(&self, file: &FileId) -> anyhow::Result<Stamp> {
        let path = self.root.join(file.path());
        let metadata = std::fs::metadata(&path).with_context(|| format!("failed to stat {}", path.display()))?;
        let modified_ns = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_nanos() as u64);
        Ok(Stamp {
            modified_ns,
            len: metadata.len(),
        })
    }
}
