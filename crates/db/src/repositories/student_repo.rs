//! Repository for the `students` table.

use classchat_core::chat::Student;
use classchat_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::student::StudentRow;

const COLUMNS: &str = "id, session_id, username, status, last_active, connection_id, created_at";

/// Provides CRUD operations for session students.
pub struct StudentRepo;

impl StudentRepo {
    /// Insert a student or refresh an existing one in the same session.
    ///
    /// Returns `false` if the persistent id already belongs to a different
    /// session (the row is left untouched).
    pub async fn upsert(pool: &PgPool, student: &Student) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO students (id, session_id, username, status, last_active, connection_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                 username = EXCLUDED.username, \
                 status = EXCLUDED.status, \
                 last_active = EXCLUDED.last_active, \
                 connection_id = EXCLUDED.connection_id \
             WHERE students.session_id = EXCLUDED.session_id",
        )
        .bind(&student.id)
        .bind(&student.session_id)
        .bind(&student.username)
        .bind(student.status.as_str())
        .bind(student.last_active)
        .bind(&student.connection_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a student by persistent id or current connection id.
    ///
    /// A persistent-id match wins over a connection-id match.
    pub async fn find_by_key(
        pool: &PgPool,
        session_id: &str,
        key: &str,
    ) -> Result<Option<StudentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM students \
             WHERE session_id = $1 AND (id = $2 OR connection_id = $2) \
             ORDER BY (id = $2) DESC, last_active DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, StudentRow>(&query)
            .bind(session_id)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Find a student whose username matches case-insensitively.
    pub async fn find_by_username(
        pool: &PgPool,
        session_id: &str,
        username: &str,
    ) -> Result<Option<StudentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM students \
             WHERE session_id = $1 AND LOWER(username) = LOWER(TRIM($2)) \
             ORDER BY created_at ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, StudentRow>(&query)
            .bind(session_id)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// List a session's students in join order.
    pub async fn list_for_session(
        pool: &PgPool,
        session_id: &str,
        include_offline: bool,
    ) -> Result<Vec<StudentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM students \
             WHERE session_id = $1 AND ($2 OR status <> 'offline') \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, StudentRow>(&query)
            .bind(session_id)
            .bind(include_offline)
            .fetch_all(pool)
            .await
    }

    /// Update status and last-active time. Returns `true` if a row changed.
    pub async fn update_status(
        pool: &PgPool,
        session_id: &str,
        id: &str,
        status: &str,
        last_active: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE students SET status = $3, last_active = $4 \
             WHERE session_id = $1 AND id = $2",
        )
        .bind(session_id)
        .bind(id)
        .bind(status)
        .bind(last_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a student record. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, session_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM students WHERE session_id = $1 AND id = $2")
            .bind(session_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
