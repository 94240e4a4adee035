//! Per-project configuration (`callgraph.toml`)

use std::path::Path;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// File name looked up at the project root.
pub const CONFIG_FILE: &str = "callgraph.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Globs (relative to the root) never analyzed.
    pub exclude: Vec<String>,
    /// Globs marking test sources; left out of area builds unless tests are included.
    pub test_patterns: Vec<String>,
    /// Parser threads and rayon pool size. `None` uses the number of CPUs.
    pub workers: Option<usize>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            exclude: vec!["target/**".to_string()],
            test_patterns: vec![
                "tests/**".to_string(),
                "**/tests/**".to_string(),
                "**/tests.rs".to_string(),
                "**/*_test.rs".to_string(),
                "benches/**".to_string(),
            ],
            workers: None,
        }
    }
}

impl ProjectConfig {
    /// Read `callgraph.toml` from `root`, or defaults when it does not exist.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Effective worker count, at least 1.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(2, |n| n.get()))
            .max(1)
    }

    pub fn exclude_set(&self) -> anyhow::Result<GlobSet> {
        build_globset(&self.exclude)
    }

    pub fn test_set(&self) -> anyhow::Result<GlobSet> {
        build_globset(&self.test_patterns)
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob `{}`", pattern))?);
    }
    Ok(builder.build()?)
}
