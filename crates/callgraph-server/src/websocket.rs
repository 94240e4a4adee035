//! WebSocket handling for snapshot notifications

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use callgraph_core::SnapshotDiff;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ServerState;

/// WebSocket message types for client-server communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Sent on connect: the generation currently published (0 if none)
    Hello { generation: u64 },
    /// A build finished and replaced the current snapshot
    SnapshotPublished {
        generation: u64,
        nodes: usize,
        edges: usize,
        diff: SnapshotDiff,
    },
    /// Client asks for the current generation
    RequestGeneration,
    /// Ping/pong for keepalive
    Ping,
    Pong,
    /// Error message
    Error { message: String },
}

impl WsMessage {
    fn to_text(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                warn!("Failed to serialize WebSocket message: {}", e);
                None
            }
        }
    }
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn current_generation(state: &ServerState) -> u64 {
    state.builder.current().map_or(0, |snapshot| snapshot.generation)
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();
    // replies to client requests go through the send task
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<WsMessage>();

    let hello = WsMessage::Hello {
        generation: current_generation(&state),
    };
    if let Some(message) = hello.to_text() {
        if sender.send(message).await.is_err() {
            warn!("Failed to greet WebSocket client");
            return;
        }
    }

    let state_clone = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                    let reply = match serde_json::from_str::<WsMessage>(&text) {
                        Ok(ws_msg) => handle_client_message(ws_msg, &state_clone),
                        Err(e) => Some(WsMessage::Error {
                            message: format!("invalid message: {}", e),
                        }),
                    };
                    if let Some(reply) = reply {
                        if reply_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    debug!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                event = rx.recv() => match event {
                    Ok(json) => Message::Text(json),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged behind by {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply.and_then(|r| r.to_text()) {
                    Some(message) => message,
                    None => break,
                },
            };
            if sender.send(outgoing).await.is_err() {
                debug!("Failed to send message to WebSocket client");
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed");
}

/// Reply, if any, to a message received from the client
fn handle_client_message(msg: WsMessage, state: &ServerState) -> Option<WsMessage> {
    match msg {
        WsMessage::RequestGeneration => Some(WsMessage::Hello {
            generation: current_generation(state),
        }),
        WsMessage::Ping => Some(WsMessage::Pong),
        other => {
            debug!("Ignoring client message: {:?}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_state;
    use callgraph_core::{AreaScope, BuildRequest};

    #[test]
    fn test_ws_message_serialization() {
        let json = serde_json::to_string(&WsMessage::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);

        let parsed: WsMessage = serde_json::from_str(r#"{"type":"request_generation"}"#).unwrap();
        assert!(matches!(parsed, WsMessage::RequestGeneration));
    }

    #[test]
    fn test_client_messages_get_replies() {
        let state = fake_state();
        assert!(matches!(handle_client_message(WsMessage::Ping, &state), Some(WsMessage::Pong)));
        assert!(matches!(
            handle_client_message(WsMessage::RequestGeneration, &state),
            Some(WsMessage::Hello { generation: 0 })
        ));
        assert!(handle_client_message(WsMessage::Pong, &state).is_none());
    }

    #[tokio::test]
    async fn test_build_broadcasts_snapshot_event() {
        let state = fake_state();
        let mut rx = state.events_tx.subscribe();

        state
            .run_build(BuildRequest::area(AreaScope::whole_project()))
            .await
            .unwrap();

        let event: WsMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        match event {
            WsMessage::SnapshotPublished {
                generation,
                nodes,
                edges,
                diff,
            } => {
                assert_eq!(generation, 1);
                assert_eq!(nodes, 3);
                assert_eq!(edges, 2);
                assert_eq!(diff.added_nodes.len(), 3);
                assert_eq!(diff.from_generation, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        state
            .run_build(BuildRequest::area(AreaScope::whole_project()))
            .await
            .unwrap();
        let event: WsMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        match event {
            WsMessage::SnapshotPublished { generation, diff, .. } => {
                assert_eq!(generation, 2);
                assert_eq!((diff.from_generation, diff.to_generation), (1, 2));
                assert!(diff.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
