//! WebSocket Protocol Types
//!
//! Frames are JSON text. Server frames carry a `type` tag with a `payload`;
//! client frames are a bare `{username, text}` object.

use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Inbound client frame. Anything that does not parse into this shape is
/// dropped without a response and the connection stays open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub username: String,
    pub text: String,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Bounded replay of persisted messages, oldest first. Sent once,
    /// immediately after the connection is accepted.
    History(Vec<ChatMessage>),
    /// A single committed message, fanned out to every active connection
    /// (sender included).
    Message(ChatMessage),
    /// Store failure while persisting this connection's message. Sent to the
    /// originating connection only; the connection stays open.
    Error { message: String },
}
