//! REST API handlers

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use callgraph_core::{
    BuildError, BuildOutcome, BuildRequest, ClosureDirection, Dependency, DisplayFilter, GraphDocument, MethodId,
    Scope, VisibleSet,
};
use serde::{Deserialize, Serialize};

use crate::ServerState;

/// Error body for every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        let status = match err {
            BuildError::LayoutUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BuildError::Cancelled => StatusCode::CONFLICT,
            BuildError::Graph(_) | BuildError::Project(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, format!("{:#}", anyhow::Error::from(err)))
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub generation: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: state.builder.current().map_or(0, |s| s.generation),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    #[serde(default)]
    pub fit: bool,
    pub public: Option<bool>,
    pub restricted: Option<bool>,
    pub private: Option<bool>,
    pub query: Option<String>,
}

impl GraphQuery {
    fn filter(&self) -> DisplayFilter {
        let defaults = DisplayFilter::default();
        DisplayFilter {
            public: self.public.unwrap_or(defaults.public),
            restricted: self.restricted.unwrap_or(defaults.restricted),
            private: self.private.unwrap_or(defaults.private),
            query: self.query.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub graph: GraphDocument,
    pub visible: VisibleSet,
}

/// Current snapshot, optionally fitted to the viewport, with the display filter applied
pub async fn get_graph(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<GraphQuery>,
) -> ApiResult<GraphResponse> {
    let snapshot = state
        .builder
        .current()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "no graph has been built yet"))?;
    Ok(Json(GraphResponse {
        graph: snapshot.to_document(query.fit),
        visible: query.filter().apply(&snapshot),
    }))
}

/// Build request body; closure seeds are given by qualified name.
#[derive(Debug, Deserialize)]
pub struct BuildBody {
    pub scope: Scope,
    #[serde(default)]
    pub seeds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub status: String,
    pub generation: Option<u64>,
    pub nodes: usize,
    pub edges: usize,
}

/// Run a build and wait for it. A build superseded by a newer request answers 409.
pub async fn post_build(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<BuildBody>,
) -> Result<(StatusCode, Json<BuildResponse>), ApiError> {
    let seeds = resolve_seeds(&state, &body.seeds).await?;
    let outcome = state
        .run_build(BuildRequest {
            scope: body.scope,
            seeds,
        })
        .await?;

    Ok(match outcome {
        BuildOutcome::Completed(snapshot) => (
            StatusCode::OK,
            Json(BuildResponse {
                status: "completed".to_string(),
                generation: Some(snapshot.generation),
                nodes: snapshot.graph.node_count(),
                edges: snapshot.graph.edge_count(),
            }),
        ),
        BuildOutcome::Cancelled => (
            StatusCode::CONFLICT,
            Json(BuildResponse {
                status: "cancelled".to_string(),
                generation: None,
                nodes: 0,
                edges: 0,
            }),
        ),
    })
}

/// Map qualified names to method ids, refreshing the dependency store first.
async fn resolve_seeds(state: &Arc<ServerState>, names: &[String]) -> Result<BTreeSet<MethodId>, ApiError> {
    if names.is_empty() {
        return Ok(BTreeSet::new());
    }
    let builder = Arc::clone(&state.builder);
    let names = names.to_vec();
    tokio::task::spawn_blocking(move || {
        builder.refresh()?;
        let mut seeds = BTreeSet::new();
        for name in &names {
            let found = builder.lookup_method(name);
            if found.is_empty() {
                return Err(ApiError::new(StatusCode::NOT_FOUND, format!("no method named `{}`", name)));
            }
            seeds.extend(found.into_iter().map(|m| m.id));
        }
        Ok(seeds)
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}

#[derive(Debug, Deserialize)]
pub struct ClosureQuery {
    pub method: String,
    #[serde(default = "default_direction")]
    pub direction: ClosureDirection,
}

fn default_direction() -> ClosureDirection {
    ClosureDirection::Both
}

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClosureEdge {
    pub caller: String,
    pub callee: String,
}

#[derive(Debug, Serialize)]
pub struct ClosureResponse {
    pub method: String,
    pub direction: ClosureDirection,
    pub edges: Vec<ClosureEdge>,
}

/// Upstream/downstream edges of a method, without building a graph
pub async fn get_closure(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ClosureQuery>,
) -> ApiResult<ClosureResponse> {
    let seeds = resolve_seeds(&state, std::slice::from_ref(&query.method)).await?;
    let builder = &state.builder;

    let mut dependencies: Vec<Dependency> = match query.direction {
        ClosureDirection::Upstream => builder.upstream_closure(&seeds).into_iter().collect(),
        ClosureDirection::Downstream => builder.downstream_closure(&seeds).into_iter().collect(),
        ClosureDirection::Both => builder
            .upstream_closure(&seeds)
            .into_iter()
            .chain(builder.downstream_closure(&seeds))
            .collect(),
    };
    dependencies.sort();
    dependencies.dedup();

    let label = |id: MethodId| {
        builder
            .method(id)
            .map_or_else(|| id.to_string(), |m| m.qualified_name)
    };
    let mut edges: Vec<ClosureEdge> = dependencies
        .into_iter()
        .map(|d| ClosureEdge {
            caller: label(d.caller),
            callee: label(d.callee),
        })
        .collect();
    edges.sort();

    Ok(Json(ClosureResponse {
        method: query.method,
        direction: query.direction,
        edges,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub done: usize,
    pub total: usize,
}

/// Extraction progress of the running (or last) build
pub async fn get_progress(State(state): State<Arc<ServerState>>) -> Json<ProgressResponse> {
    let (done, total) = state.progress.get();
    Json(ProgressResponse { done, total })
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: String,
}

/// Forget every cached dependency, in memory and on disk
pub async fn delete_cache(State(state): State<Arc<ServerState>>) -> ApiResult<ClearResponse> {
    state.builder.clear_store();
    if let Some(root) = &state.cache_root {
        callgraph_core::clear_cache(root).map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }
    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_state;
    use callgraph_core::AreaScope;

    #[test]
    fn test_health_check() {
        let state = fake_state();
        let Json(health) = tokio_test::block_on(health_check(State(state)));
        assert_eq!(health.status, "ok");
        assert_eq!(health.generation, 0);
    }

    #[tokio::test]
    async fn test_graph_before_first_build_is_not_found() {
        let state = fake_state();
        let err = get_graph(State(state), Query(GraphQuery::default())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_build_then_fetch_fitted_graph() {
        let state = fake_state();
        let body = BuildBody {
            scope: Scope::Area(AreaScope::whole_project()),
            seeds: Vec::new(),
        };
        let (status, Json(built)) = post_build(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(built.generation, Some(1));
        assert_eq!((built.nodes, built.edges), (3, 2));

        let query = GraphQuery {
            fit: true,
            ..GraphQuery::default()
        };
        let Json(graph) = get_graph(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(graph.graph.nodes.len(), 3);
        for node in &graph.graph.nodes {
            assert!((0.1 - 1e-9..=0.9 + 1e-9).contains(&node.position.x));
            assert!((0.1 - 1e-9..=0.9 + 1e-9).contains(&node.position.y));
        }
        assert_eq!(graph.visible.nodes.len(), 3);

        let Json(progress) = get_progress(State(state)).await;
        assert_eq!((progress.done, progress.total), (4, 4));
    }

    #[tokio::test]
    async fn test_closure_by_name() {
        let state = fake_state();
        let query = ClosureQuery {
            method: "decode".to_string(),
            direction: ClosureDirection::Upstream,
        };
        let Json(closure) = get_closure(State(state.clone()), Query(query)).await.unwrap();
        let edges: Vec<(&str, &str)> = closure
            .edges
            .iter()
            .map(|e| (e.caller.as_str(), e.callee.as_str()))
            .collect();
        assert_eq!(edges, vec![("Api::route", "decode"), ("Api::serve", "Api::route")]);

        let missing = ClosureQuery {
            method: "nope".to_string(),
            direction: ClosureDirection::Both,
        };
        let err = get_closure(State(state), Query(missing)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_full_extraction() {
        let state = fake_state();
        state.builder.refresh().unwrap();
        state.builder.refresh().unwrap();
        assert_eq!(state.builder.last_report().reparsed, 0);

        let Json(cleared) = delete_cache(State(state.clone())).await.unwrap();
        assert_eq!(cleared.status, "cleared");
        assert!(state.builder.lookup_method("decode").is_empty());

        state.builder.refresh().unwrap();
        assert_eq!(state.builder.last_report().reparsed, 2);
        assert_eq!(state.builder.lookup_method("decode").len(), 1);
    }
}
