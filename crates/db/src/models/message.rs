//! `messages` table row.

use classchat_core::chat::ChatMessage;
use classchat_core::error::CoreError;
use classchat_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `messages` table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub sender: String,
    pub sender_name: String,
    pub body: String,
    pub sent_at: Timestamp,
    pub message_type: String,
    pub role: String,
    pub recipient: Option<String>,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = CoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: row.id,
            session_id: row.session_id,
            sender: row.sender,
            sender_name: row.sender_name,
            text: row.body,
            timestamp: row.sent_at,
            kind: row.message_type.parse()?,
            role: row.role.parse()?,
            recipient: row.recipient,
        })
    }
}
