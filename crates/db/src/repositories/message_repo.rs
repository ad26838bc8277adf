//! Repository for the `messages` table.

use classchat_core::chat::ChatMessage;
use sqlx::PgPool;

use crate::models::message::MessageRow;

const COLUMNS: &str =
    "id, session_id, sender, sender_name, body, sent_at, message_type, role, recipient";

/// Provides insert and query operations for chat messages.
///
/// Messages are immutable: there is no update or delete.
pub struct MessageRepo;

impl MessageRepo {
    /// Persist one message.
    pub async fn insert(pool: &PgPool, msg: &ChatMessage) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO messages \
                 (id, session_id, sender, sender_name, body, sent_at, message_type, role, recipient) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&msg.id)
        .bind(&msg.session_id)
        .bind(&msg.sender)
        .bind(&msg.sender_name)
        .bind(&msg.text)
        .bind(msg.timestamp)
        .bind(msg.kind.as_str())
        .bind(msg.role.as_str())
        .bind(&msg.recipient)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All messages of a session, oldest first.
    pub async fn list_for_session(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Vec<MessageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM messages WHERE session_id = $1 \
             ORDER BY sent_at ASC, created_at ASC"
        );
        sqlx::query_as::<_, MessageRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// Messages sent by, sent under the display name of, or addressed to a
    /// student, oldest first.
    pub async fn list_involving_student(
        pool: &PgPool,
        session_id: &str,
        student_id: &str,
        username: &str,
    ) -> Result<Vec<MessageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE session_id = $1 \
               AND (sender = $2 OR LOWER(sender_name) = LOWER($3) OR recipient = $2) \
             ORDER BY sent_at ASC, created_at ASC"
        );
        sqlx::query_as::<_, MessageRow>(&query)
            .bind(session_id)
            .bind(student_id)
            .bind(username)
            .fetch_all(pool)
            .await
    }
}
