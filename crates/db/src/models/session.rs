//! `sessions` table row.

use classchat_core::chat::Session;
use classchat_core::error::CoreError;
use classchat_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub created_at: Timestamp,
    pub status: String,
    pub teacher_id: Option<String>,
}

impl TryFrom<SessionRow> for Session {
    type Error = CoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            created_at: row.created_at,
            status: row.status.parse()?,
            teacher_id: row.teacher_id,
        })
    }
}
