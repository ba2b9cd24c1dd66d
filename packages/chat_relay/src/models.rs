use serde::{Deserialize, Serialize};

/// A persisted chat message. `id` and `created_at` are assigned by the store
/// at insert time and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// SQLite rowid — monotonic in commit order.
    pub id: i64,
    /// Client-asserted display name. Not authenticated, not unique.
    pub username: String,
    /// Message body. Empty bodies are accepted.
    pub text: String,
    /// Unix timestamp (seconds) at persistence time.
    pub created_at: i64,
}
