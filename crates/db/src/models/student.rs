//! `students` table row.

use classchat_core::chat::Student;
use classchat_core::error::CoreError;
use classchat_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `students` table.
#[derive(Debug, Clone, FromRow)]
pub struct StudentRow {
    pub id: String,
    pub session_id: String,
    pub username: String,
    pub status: String,
    pub last_active: Timestamp,
    pub connection_id: Option<String>,
    pub created_at: Timestamp,
}

impl TryFrom<StudentRow> for Student {
    type Error = CoreError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(Student {
            id: row.id,
            session_id: row.session_id,
            username: row.username,
            status: row.status.parse()?,
            last_active: row.last_active,
            connection_id: row.connection_id,
        })
    }
}
