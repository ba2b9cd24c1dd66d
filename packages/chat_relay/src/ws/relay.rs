//! Relay Engine
//!
//! Single actor that serializes persist-then-broadcast per message. Commands
//! are processed in arrival order, so the broadcast order every client
//! observes matches the order the store committed the messages, no matter how
//! concurrent senders interleave at the network layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics::ServerMetrics;
use crate::repository::MessageRepository;

use super::protocol::ServerMessage;
use super::registry::{ConnectionRegistry, ConnectionSender};

/// Commands accepted by the relay engine.
#[derive(Debug)]
enum RelayCommand {
    Publish {
        username: String,
        text: String,
        /// Outbound queue of the originating connection, used only for
        /// store-failure reports.
        origin: ConnectionSender,
    },
}

/// Handle for submitting messages to the relay engine.
#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Queue a message for persistence and fan-out. Returns once the engine
    /// has accepted the command; a message accepted here is persisted and
    /// broadcast even if the sender disconnects meanwhile.
    pub async fn publish(&self, username: String, text: String, origin: ConnectionSender) {
        let cmd = RelayCommand::Publish {
            username,
            text,
            origin,
        };
        if self.sender.send(cmd).await.is_err() {
            warn!("Relay engine is gone, dropping message");
        }
    }
}

/// Spawn the engine loop and return its handle. The loop ends when every
/// handle has been dropped.
pub fn spawn_relay_engine(
    repository: Arc<MessageRepository>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
) -> RelayHandle {
    let (sender, mut receiver) = mpsc::channel(256);

    tokio::spawn(async move {
        while let Some(cmd) = receiver.recv().await {
            match cmd {
                RelayCommand::Publish {
                    username,
                    text,
                    origin,
                } => {
                    // Append must complete before the broadcast snapshot is
                    // taken: clients only ever see durable records.
                    match repository.insert_message(&username, &text).await {
                        Ok(message) => {
                            let delivered =
                                registry.broadcast(&ServerMessage::Message(message)).await;
                            metrics.message_broadcast();
                            debug!(recipients = delivered, "Message fanned out");
                        }
                        Err(e) => {
                            warn!("Failed to persist message: {}", e);
                            metrics.store_error();
                            // Reported to the sender only; the connection
                            // stays open and later sends go through normally.
                            let _ = origin.send(ServerMessage::Error {
                                message: format!("message not delivered: {}", e),
                            });
                        }
                    }
                }
            }
        }
        debug!("Relay engine stopped");
    });

    RelayHandle { sender }
}
