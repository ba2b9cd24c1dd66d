//! Per-connection WebSocket handler.
//!
//! Drives one client connection: register in the registry, replay history,
//! then pump frames until the transport closes.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::AppState;

use super::protocol::{ClientMessage, ServerMessage};

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Client connected");
    state.metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue: the registry and relay engine enqueue here, the writer
    // task below drains into the socket.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.registry.register(connection_id, tx.clone()).await;

    // History replay goes to this connection only. A store failure degrades
    // to an empty payload rather than refusing the connection.
    let history = match state
        .repository
        .recent_messages(state.config.history_limit)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            warn!(connection_id = %connection_id, "Failed to fetch history: {}", e);
            state.metrics.store_error();
            Vec::new()
        }
    };
    state.metrics.history_replayed();
    if tx.send(ServerMessage::History(history)).is_err() {
        warn!(connection_id = %connection_id, "Outbound queue closed before history replay");
    }

    // Writer: serialize outbound frames into the socket.
    let writer_task = async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Reader: parse inbound frames and hand them to the relay engine.
    let relay = state.relay.clone();
    let metrics = state.metrics.clone();
    let origin = tx.clone();
    let reader_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.message_received();
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(inbound) => {
                            relay
                                .publish(inbound.username, inbound.text, origin.clone())
                                .await;
                        }
                        Err(e) => {
                            // Malformed frames are dropped without a response
                            metrics.malformed_message();
                            debug!(connection_id = %connection_id, "Dropping malformed frame: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %connection_id, "Client closed connection");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = writer_task => debug!(connection_id = %connection_id, "Writer task ended"),
        _ = reader_task => debug!(connection_id = %connection_id, "Reader task ended"),
    }

    // Either side ending closes the connection: unregister exactly once and
    // drop every reference to the outbound queue.
    state.registry.unregister(connection_id).await;
    state.metrics.connection_closed();
    info!(connection_id = %connection_id, "Client disconnected");
}
