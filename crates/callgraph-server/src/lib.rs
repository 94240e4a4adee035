//! HTTP + WebSocket server over a call graph builder

pub mod handlers;
pub mod router;
pub mod websocket;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use callgraph_core::{AtomicProgress, BuildError, BuildOutcome, BuildRequest, CallGraphBuilder};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::websocket::WsMessage;

/// Capacity of the event channel; slow clients beyond this skip events.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

/// State shared by every handler.
pub struct ServerState {
    pub builder: Arc<CallGraphBuilder>,
    pub progress: Arc<AtomicProgress>,
    /// Serialized [`WsMessage`]s for connected clients
    pub events_tx: broadcast::Sender<String>,
    /// Where the dependency cache is persisted after each build
    pub cache_root: Option<PathBuf>,
}

impl ServerState {
    pub fn new(builder: Arc<CallGraphBuilder>, progress: Arc<AtomicProgress>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        ServerState {
            builder,
            progress,
            events_tx,
            cache_root: None,
        }
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Send a message to every connected client. Errors when nobody listens.
    pub fn broadcast(&self, message: String) -> Result<usize, broadcast::error::SendError<String>> {
        self.events_tx.send(message)
    }

    /// Run a build off the async runtime, then notify clients and persist the cache.
    pub async fn run_build(self: &Arc<Self>, request: BuildRequest) -> Result<BuildOutcome, BuildError> {
        let state = Arc::clone(self);
        let outcome = tokio::task::spawn_blocking(move || state.builder.build(&request))
            .await
            .map_err(|e| BuildError::Project(anyhow::anyhow!("build task failed: {}", e)))??;

        if let BuildOutcome::Completed(snapshot) = &outcome {
            let message = WsMessage::SnapshotPublished {
                generation: snapshot.generation,
                nodes: snapshot.graph.node_count(),
                edges: snapshot.graph.edge_count(),
                diff: snapshot.diff.clone(),
            };
            match serde_json::to_string(&message) {
                Ok(json) => {
                    // no subscribers is fine
                    let _ = self.broadcast(json);
                }
                Err(e) => warn!("Failed to serialize snapshot event: {}", e),
            }
            self.persist_cache().await;
        }
        Ok(outcome)
    }

    async fn persist_cache(self: &Arc<Self>) {
        let Some(root) = self.cache_root.clone() else {
            return;
        };
        let state = Arc::clone(self);
        let saved = tokio::task::spawn_blocking(move || state.builder.save_cache(&root)).await;
        match saved {
            Ok(Ok(meta)) => tracing::debug!("Cache saved: {} dependencies", meta.dependencies),
            Ok(Err(e)) => warn!("Failed to save dependency cache: {}", e),
            Err(e) => warn!("Cache task failed: {}", e),
        }
    }
}

/// The HTTP server.
pub struct CallgraphServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl CallgraphServer {
    pub fn new(state: ServerState, config: ServerConfig) -> Self {
        CallgraphServer {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on http://{}", addr);
        axum::serve(listener, router::create_router(self.state)).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use callgraph_core::test_utils::FakeProject;
    use callgraph_core::{AtomicProgress, CallGraphBuilder};

    use crate::ServerState;

    pub fn fake_state() -> Arc<ServerState> {
        let project = Arc::new(
            FakeProject::new()
                .with_file("src/api.rs", &["Api::serve", "Api::route"], &[("Api::serve", "Api::route"), ("Api::route", "decode")])
                .with_file("src/codec.rs", &["decode"], &[]),
        );
        let progress = Arc::new(AtomicProgress::new());
        let mut context = project.context();
        context.progress = progress.clone();
        let builder = Arc::new(CallGraphBuilder::new(context));
        Arc::new(ServerState::new(builder, progress))
    }
}
