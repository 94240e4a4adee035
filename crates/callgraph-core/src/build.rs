//! Build orchestration: refresh, select, lay out, publish

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{self, CacheError, CacheMeta};
use crate::cancel::CancellationToken;
use crate::error::{BuildError, BuildOutcome};
use crate::graph::CallGraph;
use crate::layout::{LayoutComposer, LayoutOracle};
use crate::model::{Dependency, MethodId, MethodInfo};
use crate::progress::ProgressSink;
use crate::snapshot::{GraphSnapshot, SnapshotCell};
use crate::source::{FileEnumerator, SourceExtractor};
use crate::store::{DependencyStore, RefreshReport};
use crate::view::{self, AreaScope, ClosureDirection, Scope};

/// The collaborators a builder works with.
#[derive(Clone)]
pub struct ProjectContext {
    pub enumerator: Arc<dyn FileEnumerator>,
    pub extractor: Arc<dyn SourceExtractor>,
    pub oracle: Arc<dyn LayoutOracle>,
    pub progress: Arc<dyn ProgressSink>,
}

/// What to build: a scope, plus seed methods for closure scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub scope: Scope,
    #[serde(default)]
    pub seeds: BTreeSet<MethodId>,
}

impl BuildRequest {
    pub fn area(area: AreaScope) -> Self {
        BuildRequest {
            scope: Scope::Area(area),
            seeds: BTreeSet::new(),
        }
    }

    pub fn closure(direction: ClosureDirection, seeds: BTreeSet<MethodId>) -> Self {
        BuildRequest {
            scope: Scope::Closure { direction },
            seeds,
        }
    }
}

/// Runs builds one at a time and publishes their results.
///
/// Starting a build cancels the one in flight. The superseded build returns
/// [`BuildOutcome::Cancelled`] at its next cancellation check and publishes nothing.
pub struct CallGraphBuilder {
    context: ProjectContext,
    composer: LayoutComposer,
    store: Mutex<DependencyStore>,
    in_flight: Mutex<Option<CancellationToken>>,
    snapshots: SnapshotCell,
}

impl CallGraphBuilder {
    pub fn new(context: ProjectContext) -> Self {
        Self::with_store(context, DependencyStore::new())
    }

    /// Start from a previously persisted store.
    pub fn with_store(context: ProjectContext, store: DependencyStore) -> Self {
        let composer = LayoutComposer::new(Arc::clone(&context.oracle));
        CallGraphBuilder {
            context,
            composer,
            store: Mutex::new(store),
            in_flight: Mutex::new(None),
            snapshots: SnapshotCell::new(),
        }
    }

    pub fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        let token = self.begin();
        match self.run(request, &token) {
            Ok(snapshot) => Ok(BuildOutcome::Completed(snapshot)),
            Err(BuildError::Cancelled) => {
                info!("Build cancelled");
                Ok(BuildOutcome::Cancelled)
            }
            Err(err) => Err(err),
        }
    }

    /// Cancel the in-flight build, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.lock_in_flight().take() {
            token.cancel();
        }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Option<Arc<GraphSnapshot>> {
        self.snapshots.current()
    }

    /// Bring the dependency store up to date without building a graph.
    pub fn refresh(&self) -> Result<HashSet<Dependency>, BuildError> {
        let files = self.context.enumerator.snapshot()?;
        let mut store = self.lock_store();
        store.refresh(
            &files,
            self.context.extractor.as_ref(),
            self.context.progress.as_ref(),
            &CancellationToken::new(),
        )
    }

    /// What the most recent refresh touched.
    pub fn last_report(&self) -> RefreshReport {
        self.lock_store().last_report().clone()
    }

    /// Edges leading to `seeds`, from the last refreshed dependency set.
    pub fn upstream_closure(&self, seeds: &BTreeSet<MethodId>) -> HashSet<Dependency> {
        view::upstream_closure(&self.lock_store().dependencies(), seeds)
    }

    /// Edges leading away from `seeds`, from the last refreshed dependency set.
    pub fn downstream_closure(&self, seeds: &BTreeSet<MethodId>) -> HashSet<Dependency> {
        view::downstream_closure(&self.lock_store().dependencies(), seeds)
    }

    /// Methods whose qualified name (or `Owner::name`) equals `qualified_name`.
    pub fn lookup_method(&self, qualified_name: &str) -> Vec<MethodInfo> {
        let store = self.lock_store();
        let symbols = store.symbols();
        symbols
            .find_by_qualified_name(qualified_name)
            .into_iter()
            .filter_map(|id| symbols.lookup(id))
            .collect()
    }

    pub fn method(&self, id: MethodId) -> Option<MethodInfo> {
        self.lock_store().symbols().lookup(id)
    }

    pub fn save_cache(&self, root: &Path) -> Result<CacheMeta, CacheError> {
        cache::save_store(&self.lock_store(), root)
    }

    /// Drop all cached dependencies in memory.
    pub fn clear_store(&self) {
        self.lock_store().clear();
    }

    /// Install a fresh token, cancelling the previous one.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_in_flight().replace(token.clone()) {
            debug!("Superseding in-flight build");
            previous.cancel();
        }
        token
    }

    fn run(&self, request: &BuildRequest, cancel: &CancellationToken) -> Result<Arc<GraphSnapshot>, BuildError> {
        let files = self.context.enumerator.snapshot()?;
        cancel.check()?;

        let mut snapshot = {
            let mut store = self.lock_store();
            // a newer build may have been waiting on the lock
            cancel.check()?;
            let dependencies = store.refresh(
                &files,
                self.context.extractor.as_ref(),
                self.context.progress.as_ref(),
                cancel,
            )?;

            let area_files = match request.scope.area() {
                Some(area) => self.context.enumerator.files_in_scope(area)?,
                None => BTreeSet::new(),
            };
            let methods = view::methods_in_scope(&request.scope, &area_files, store.symbols(), &request.seeds);
            let selected = view::dependency_view(&request.scope, &methods, &dependencies);
            debug!(
                "Scope selected {} methods and {} dependencies",
                methods.len(),
                selected.len()
            );

            let graph = CallGraph::from_view(&methods, &selected)?;
            GraphSnapshot::new(request.scope.clone(), graph, store.symbols())
        };

        self.composer.layout(&mut snapshot.graph, cancel)?;
        cancel.check()?;

        let (published, _) = self.snapshots.publish(snapshot);
        info!(
            "Published generation {}: {} nodes, {} edges",
            published.generation,
            published.graph.node_count(),
            published.graph.edge_count()
        );
        Ok(published)
    }

    fn lock_store(&self) -> MutexGuard<'_, DependencyStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
