//! Connection Registry
//!
//! Authoritative set of live connection handles, shared by every connection
//! task and the relay engine.

use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::ServerMessage;

/// Sending half of one connection's outbound queue. The socket writer task on
/// the other end drains it, so enqueueing here never waits on a slow client.
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, ConnectionSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle. Each connection registers once, at accept time.
    pub async fn register(&self, id: Uuid, sender: ConnectionSender) {
        self.connections.write().await.insert(id, sender);
        debug!(connection_id = %id, "Connection registered");
    }

    /// Remove a handle. Safe to call repeatedly; missing ids are ignored.
    pub async fn unregister(&self, id: Uuid) {
        if self.connections.write().await.remove(&id).is_some() {
            debug!(connection_id = %id, "Connection unregistered");
        }
    }

    /// Deliver `message` to every handle present when the snapshot is taken.
    /// A handle whose receiver is gone gets evicted; one dead connection
    /// never prevents delivery to the rest. Returns the delivered count.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let snapshot: Vec<(Uuid, ConnectionSender)> = {
            let connections = self.connections.read().await;
            connections.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        for id in dead {
            warn!(connection_id = %id, "Evicting connection after failed send");
            self.unregister(id).await;
        }

        delivered
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}
