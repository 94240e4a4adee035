//! On-disk persistence of the dependency store

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::DependencyStore;

/// Cache directory: .callgraph/
pub const CACHE_DIR: &str = ".callgraph";

/// Dependency store, bincode-encoded
pub const STORE_FILE: &str = "dependencies.bin";

/// Human-readable summary of the store file
pub const META_FILE: &str = "meta.json";

/// Bumped whenever the encoded layout of [`DependencyStore`] changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("cache metadata invalid: {0}")]
    Meta(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub version: String,
    pub format_version: u32,
    pub files: usize,
    pub methods: usize,
    pub dependencies: usize,
    pub saved_at: DateTime<Utc>,
}

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

pub fn store_path(root: &Path) -> PathBuf {
    cache_dir(root).join(STORE_FILE)
}

pub fn meta_path(root: &Path) -> PathBuf {
    cache_dir(root).join(META_FILE)
}

/// Write the store and its metadata under `root/.callgraph/`.
pub fn save_store(store: &DependencyStore, root: &Path) -> Result<CacheMeta, CacheError> {
    std::fs::create_dir_all(cache_dir(root))?;

    let path = store_path(root);
    let mut writer = BufWriter::new(File::create(&path)?);
    bincode::serialize_into(&mut writer, &FORMAT_VERSION)?;
    bincode::serialize_into(&mut writer, store)?;
    writer.flush()?;

    let meta = CacheMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        format_version: FORMAT_VERSION,
        files: store.file_count(),
        methods: store.method_count(),
        dependencies: store.dependency_count(),
        saved_at: Utc::now(),
    };
    std::fs::write(meta_path(root), serde_json::to_string_pretty(&meta)?)?;

    tracing::debug!("Dependency cache saved: {}", path.display());
    Ok(meta)
}

/// Load a previously saved store. `Ok(None)` when there is no cache or it
/// was written in another format.
pub fn load_store(root: &Path) -> Result<Option<DependencyStore>, CacheError> {
    let path = store_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(&path)?);
    let version: u32 = bincode::deserialize_from(&mut reader)?;
    if version != FORMAT_VERSION {
        tracing::info!(
            "Ignoring dependency cache with format {} (expected {})",
            version,
            FORMAT_VERSION
        );
        return Ok(None);
    }

    let mut store: DependencyStore = bincode::deserialize_from(&mut reader)?;
    store.rebuild_symbols();
    tracing::debug!(
        "Dependency cache loaded from {}: {} files, {} dependencies",
        path.display(),
        store.file_count(),
        store.dependency_count()
    );
    Ok(Some(store))
}

/// Summary written next to the store by [`save_store`].
pub fn load_meta(root: &Path) -> Result<Option<CacheMeta>, CacheError> {
    let path = meta_path(root);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&std::fs::read_to_string(path)?)?))
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
