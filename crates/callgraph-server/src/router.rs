//! Axum router setup for the callgraph server

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{delete_cache, get_closure, get_graph, get_progress, health_check, post_build},
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // snapshot notifications
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_check))
        .route("/api/graph", get(get_graph))
        .route("/api/build", post(post_build))
        .route("/api/closure", get(get_closure))
        .route("/api/progress", get(get_progress))
        .route("/api/cache", delete(delete_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
