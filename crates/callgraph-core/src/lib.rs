//! Callgraph core: dependency cache, call graph model, layout and view selection

pub mod build;
pub mod cache;
pub mod cancel;
pub mod error;
pub mod filter;
pub mod graph;
pub mod layout;
pub mod model;
pub mod oracle;
pub mod progress;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod symbols;
pub mod view;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use build::{BuildRequest, CallGraphBuilder, ProjectContext};
pub use cache::{CACHE_DIR, CacheError, CacheMeta, clear_cache, load_meta, load_store, save_store};
pub use cancel::CancellationToken;
pub use error::{BuildError, BuildOutcome};
pub use filter::{DisplayFilter, VisibleSet};
pub use graph::{CallGraph, Edge, GraphError, Node};
pub use layout::{Blueprint, LayoutComposer, LayoutError, LayoutOracle};
pub use model::{Dependency, DependencyOrigin, EdgeId, FileId, FileSnapshot, MethodId, MethodInfo, Point, Stamp, Visibility};
pub use oracle::LayeredLayout;
pub use progress::{AtomicProgress, LogProgress, NoProgress, ProgressSink};
pub use snapshot::{GraphDocument, GraphSnapshot, SnapshotCell, SnapshotDiff};
pub use source::{FileEnumerator, SourceExtractor};
pub use store::{DependencyStore, RefreshReport};
pub use symbols::SymbolTable;
pub use view::{AreaKind, AreaScope, ClosureDirection, Direction, Scope};
