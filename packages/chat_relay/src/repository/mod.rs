// Repository layer — message persistence lives in messages.rs with
// `impl MessageRepository`.

use sqlx::sqlite::SqlitePool;
use thiserror::Error;

mod messages;

#[cfg(test)]
pub(crate) mod test_helpers;

/// Storage failure surfaced to the relay core. Never fatal to the service:
/// history reads degrade to empty, append failures are reported to the
/// originating connection only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct MessageRepository {
    pub(crate) pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
