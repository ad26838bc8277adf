//! The message store seam used by the chat server.
//!
//! [`ChatStore`] is the contract the presence cache and the event handlers
//! depend on. [`PgChatStore`] is the production implementation on top of
//! the repositories; [`MemoryStore`](crate::MemoryStore) backs local runs
//! without a database and the test suites.

use async_trait::async_trait;
use classchat_core::chat::{ChatMessage, Session, Student, StudentStatus};
use classchat_core::types::Timestamp;

use crate::repositories::{MessageRepo, SessionRepo, StudentRepo};
use crate::{DbPool, StoreError};

/// Which messages of a session to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Every message, unfiltered.
    All,
    /// Messages the student sent (by id or display name) or received.
    InvolvingStudent { student_id: String, username: String },
}

/// Durable CRUD operations over sessions, students and messages.
///
/// Every method reports failures as [`StoreError`]; callers decide whether
/// to surface them or continue degraded.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Create an active session under a new unique five-digit code.
    async fn create_session(&self, teacher_id: Option<&str>) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Mark a session inactive. Returns `false` if it does not exist.
    async fn end_session(&self, id: &str) -> Result<bool, StoreError>;

    /// Insert or refresh a student record.
    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Find a student by persistent id or connection id.
    async fn find_student(&self, session_id: &str, key: &str)
        -> Result<Option<Student>, StoreError>;

    /// Find a student by case-insensitive username.
    async fn find_student_by_username(
        &self,
        session_id: &str,
        username: &str,
    ) -> Result<Option<Student>, StoreError>;

    /// Students of a session in join order.
    async fn list_students(
        &self,
        session_id: &str,
        include_offline: bool,
    ) -> Result<Vec<Student>, StoreError>;

    /// Returns `false` if the student does not exist.
    async fn update_student_status(
        &self,
        session_id: &str,
        id: &str,
        status: StudentStatus,
        last_active: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if the student does not exist.
    async fn delete_student(&self, session_id: &str, id: &str) -> Result<bool, StoreError>;

    async fn insert_message(&self, msg: &ChatMessage) -> Result<(), StoreError>;

    /// Messages of a session matching `filter`, ordered by timestamp.
    async fn list_messages(
        &self,
        session_id: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

/// [`ChatStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgChatStore {
    pool: DbPool,
}

impl PgChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = classchat_core::error::CoreError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl ChatStore for PgChatStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn create_session(&self, teacher_id: Option<&str>) -> Result<Session, StoreError> {
        match SessionRepo::create(&self.pool, teacher_id).await? {
            Some(row) => Ok(row.try_into()?),
            None => Err(StoreError::Conflict(
                "could not allocate a unique session code".into(),
            )),
        }
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        SessionRepo::find_by_id(&self.pool, id)
            .await?
            .map(Session::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn end_session(&self, id: &str) -> Result<bool, StoreError> {
        Ok(SessionRepo::deactivate(&self.pool, id).await?)
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
        if StudentRepo::upsert(&self.pool, student).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "student id {} belongs to another session",
                student.id
            )))
        }
    }

    async fn find_student(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Student>, StoreError> {
        StudentRepo::find_by_key(&self.pool, session_id, key)
            .await?
            .map(Student::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn find_student_by_username(
        &self,
        session_id: &str,
        username: &str,
    ) -> Result<Option<Student>, StoreError> {
        StudentRepo::find_by_username(&self.pool, session_id, username)
            .await?
            .map(Student::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_students(
        &self,
        session_id: &str,
        include_offline: bool,
    ) -> Result<Vec<Student>, StoreError> {
        convert_all(StudentRepo::list_for_session(&self.pool, session_id, include_offline).await?)
    }

    async fn update_student_status(
        &self,
        session_id: &str,
        id: &str,
        status: StudentStatus,
        last_active: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(
            StudentRepo::update_status(&self.pool, session_id, id, status.as_str(), last_active)
                .await?,
        )
    }

    async fn delete_student(&self, session_id: &str, id: &str) -> Result<bool, StoreError> {
        Ok(StudentRepo::delete(&self.pool, session_id, id).await?)
    }

    async fn insert_message(&self, msg: &ChatMessage) -> Result<(), StoreError> {
        MessageRepo::insert(&self.pool, msg).await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = match filter {
            MessageFilter::All => MessageRepo::list_for_session(&self.pool, session_id).await?,
            MessageFilter::InvolvingStudent {
                student_id,
                username,
            } => {
                MessageRepo::list_involving_student(&self.pool, session_id, student_id, username)
                    .await?
            }
        };
        convert_all(rows)
    }
}
