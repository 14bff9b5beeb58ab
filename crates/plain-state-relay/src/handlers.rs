use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info};

use crate::relay::{Relay, RelayStats};

/// WebSocket upgrade handler for `/sync`.
pub async fn ws_handler(
    State(relay): State<Arc<Relay>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

pub async fn health(State(relay): State<Arc<Relay>>) -> Json<RelayStats> {
    Json(relay.stats().await)
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (mut peer, backlog) = relay.join().await;
    let peer_id = peer.id;
    info!(peer = peer_id, backlog = backlog.len(), "WebSocket connected");

    for frame in backlog {
        if let Err(e) = ws_tx.send(Message::Binary(frame)).await {
            error!(peer = peer_id, "Failed to send backlog: {}", e);
            return;
        }
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Binary(data)) => {
                        relay.publish(peer_id, data).await;
                    }
                    Ok(Message::Text(text)) => {
                        relay.publish(peer_id, Bytes::from(text.as_str().to_owned())).await;
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            error!(peer = peer_id, "Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!(peer = peer_id, "Client requested close");
                        break;
                    }
                    Ok(Message::Pong(_)) => {}
                    Err(e) => {
                        error!(peer = peer_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            frame = peer.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = ws_tx.send(Message::Binary(frame)).await {
                    error!(peer = peer_id, "Failed to forward frame: {}", e);
                    break;
                }
            }
        }
    }

    info!(peer = peer_id, "WebSocket disconnected");
}
