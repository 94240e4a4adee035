//! Build-level errors and outcomes

use std::sync::Arc;

use thiserror::Error;

use crate::cancel::Cancelled;
use crate::graph::GraphError;
use crate::layout::LayoutError;
use crate::snapshot::GraphSnapshot;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("layout unavailable: {0}")]
    LayoutUnavailable(String),

    #[error("build cancelled")]
    Cancelled,

    #[error(transparent)]
    Project(#[from] anyhow::Error),
}

impl From<Cancelled> for BuildError {
    fn from(_: Cancelled) -> Self {
        BuildError::Cancelled
    }
}

impl From<LayoutError> for BuildError {
    fn from(err: LayoutError) -> Self {
        match err {
            LayoutError::Cancelled => BuildError::Cancelled,
            other => BuildError::LayoutUnavailable(other.to_string()),
        }
    }
}

/// Result of a build that did not fail.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Completed(Arc<GraphSnapshot>),
    /// Superseded or cancelled; nothing was published.
    Cancelled,
}

impl BuildOutcome {
    pub fn snapshot(&self) -> Option<&Arc<GraphSnapshot>> {
        match self {
            BuildOutcome::Completed(snapshot) => Some(snapshot),
            BuildOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildOutcome::Cancelled)
    }
}
