//! Repository for the `sessions` table.

use classchat_core::identity::generate_session_code;
use sqlx::PgPool;

use crate::models::session::SessionRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, created_at, status, teacher_id";

/// How many random codes to try before giving up on session creation.
pub const MAX_CODE_ATTEMPTS: usize = 16;

/// Provides CRUD operations for chat sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new active session under a freshly generated code.
    ///
    /// Codes are unique across active and inactive sessions; a collision
    /// regenerates the code. Returns `None` if every attempt collided.
    pub async fn create(
        pool: &PgPool,
        teacher_id: Option<&str>,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (id, status, teacher_id) VALUES ($1, 'active', $2) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_session_code();
            let row = sqlx::query_as::<_, SessionRow>(&query)
                .bind(&code)
                .bind(teacher_id)
                .fetch_optional(pool)
                .await?;
            match row {
                Some(row) => return Ok(Some(row)),
                None => tracing::debug!(code = %code, attempt, "Session code collision"),
            }
        }
        Ok(None)
    }

    /// Find a session by its code, active or not.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a session inactive. Returns `true` if the session exists.
    pub async fn deactivate(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET status = 'inactive' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
