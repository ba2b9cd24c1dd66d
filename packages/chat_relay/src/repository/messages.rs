use chrono::Utc;
use sqlx::Row;

use crate::models::ChatMessage;

use super::{MessageRepository, StoreError};

impl MessageRepository {
    /// Persist a message, assigning its id and created_at. The call returns
    /// only once the record is durable; the returned record is the one that
    /// gets broadcast.
    pub async fn insert_message(
        &self,
        username: &str,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        let created_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (username, body, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(text)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            text: text.to_string(),
            created_at,
        })
    }

    /// Up to `limit` most recent messages, oldest first.
    pub async fn recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, body, created_at
            FROM messages
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<ChatMessage> = rows
            .into_iter()
            .map(|r| ChatMessage {
                id: r.get("id"),
                username: r.get("username"),
                text: r.get("body"),
                created_at: r.get("created_at"),
            })
            .collect();

        // Reverse so oldest is first (natural reading order)
        messages.reverse();

        Ok(messages)
    }

    pub async fn message_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_helpers;

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let repo = test_helpers::test_repository().await;

        let first = repo.insert_message("alice", "hello").await.unwrap();
        let second = repo.insert_message("bob", "hi there").await.unwrap();

        assert!(first.id > 0);
        assert!(second.id > first.id);
        assert!(first.created_at > 0);
        assert_eq!(first.username, "alice");
        assert_eq!(first.text, "hello");
    }

    #[tokio::test]
    async fn recent_is_oldest_first() {
        let repo = test_helpers::test_repository().await;

        repo.insert_message("alice", "first").await.unwrap();
        repo.insert_message("alice", "second").await.unwrap();
        repo.insert_message("alice", "third").await.unwrap();

        let msgs = repo.recent_messages(10).await.unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].text, "first");
        assert_eq!(msgs[2].text, "third");
        assert!(msgs[0].id < msgs[1].id && msgs[1].id < msgs[2].id);
    }

    #[tokio::test]
    async fn recent_window_excludes_oldest_beyond_limit() {
        let repo = test_helpers::test_repository().await;

        for i in 0..51 {
            repo.insert_message("alice", &format!("msg {}", i))
                .await
                .unwrap();
        }

        let msgs = repo.recent_messages(50).await.unwrap();
        assert_eq!(msgs.len(), 50);
        // The very first message falls out of the window
        assert_eq!(msgs[0].text, "msg 1");
        assert_eq!(msgs[49].text, "msg 50");
    }

    #[tokio::test]
    async fn recent_returns_fewer_when_history_is_short() {
        let repo = test_helpers::test_repository().await;

        repo.insert_message("alice", "only one").await.unwrap();

        let msgs = repo.recent_messages(50).await.unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[tokio::test]
    async fn recent_on_empty_store() {
        let repo = test_helpers::test_repository().await;
        let msgs = repo.recent_messages(50).await.unwrap();
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_accepted() {
        // Current contract: no input validation on body or username
        let repo = test_helpers::test_repository().await;
        let msg = repo.insert_message("alice", "").await.unwrap();
        assert_eq!(msg.text, "");
        assert_eq!(repo.message_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn message_count_tracks_inserts() {
        let repo = test_helpers::test_repository().await;
        assert_eq!(repo.message_count().await.unwrap(), 0);
        repo.insert_message("alice", "one").await.unwrap();
        repo.insert_message("bob", "two").await.unwrap();
        assert_eq!(repo.message_count().await.unwrap(), 2);
    }
}
