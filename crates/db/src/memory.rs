//! In-process [`ChatStore`] for running without PostgreSQL and for tests.
//!
//! Data lives for the lifetime of the process. Ordering and matching rules
//! mirror the SQL queries in the repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use classchat_core::chat::{ChatMessage, Session, SessionStatus, Student, StudentStatus};
use classchat_core::identity::{generate_session_code, usernames_match};
use classchat_core::types::Timestamp;
use tokio::sync::RwLock;

use crate::repositories::session_repo::MAX_CODE_ATTEMPTS;
use crate::store::{ChatStore, MessageFilter};
use crate::StoreError;

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, Session>,
    /// Insertion order doubles as join order.
    students: Vec<Student>,
    messages: Vec<ChatMessage>,
}

/// [`ChatStore`] kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_session(&self, teacher_id: Option<&str>) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_session_code();
            if tables.sessions.contains_key(&code) {
                continue;
            }
            let session = Session {
                id: code.clone(),
                created_at: classchat_core::types::now(),
                status: SessionStatus::Active,
                teacher_id: teacher_id.map(str::to_string),
            };
            tables.sessions.insert(code, session.clone());
            return Ok(session);
        }
        Err(StoreError::Conflict(
            "could not allocate a unique session code".into(),
        ))
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn end_session(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(id) {
            Some(session) => {
                session.status = SessionStatus::Inactive;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) if existing.session_id != student.session_id => {
                Err(StoreError::Conflict(format!(
                    "student id {} belongs to another session",
                    student.id
                )))
            }
            Some(existing) => {
                existing.username = student.username.clone();
                existing.status = student.status;
                existing.last_active = student.last_active;
                existing.connection_id = student.connection_id.clone();
                Ok(())
            }
            None => {
                tables.students.push(student.clone());
                Ok(())
            }
        }
    }

    async fn find_student(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.read().await;
        let by_id = tables
            .students
            .iter()
            .find(|s| s.session_id == session_id && s.id == key);
        let found = by_id.or_else(|| {
            tables
                .students
                .iter()
                .find(|s| s.session_id == session_id && s.connection_id.as_deref() == Some(key))
        });
        Ok(found.cloned())
    }

    async fn find_student_by_username(
        &self,
        session_id: &str,
        username: &str,
    ) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .students
            .iter()
            .find(|s| s.session_id == session_id && usernames_match(&s.username, username))
            .cloned())
    }

    async fn list_students(
        &self,
        session_id: &str,
        include_offline: bool,
    ) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .students
            .iter()
            .filter(|s| s.session_id == session_id)
            .filter(|s| include_offline || s.status != StudentStatus::Offline)
            .cloned()
            .collect())
    }

    async fn update_student_status(
        &self,
        session_id: &str,
        id: &str,
        status: StudentStatus,
        last_active: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables
            .students
            .iter_mut()
            .find(|s| s.session_id == session_id && s.id == id)
        {
            Some(student) => {
                student.status = status;
                student.last_active = last_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_student(&self, session_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.students.len();
        tables
            .students
            .retain(|s| !(s.session_id == session_id && s.id == id));
        Ok(tables.students.len() < before)
    }

    async fn insert_message(&self, msg: &ChatMessage) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.messages.iter().any(|m| m.id == msg.id) {
            return Err(StoreError::Conflict(format!(
                "message id {} already exists",
                msg.id
            )));
        }
        tables.messages.push(msg.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let tables = self.tables.read().await;
        let mut out: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| match filter {
                MessageFilter::All => true,
                MessageFilter::InvolvingStudent {
                    student_id,
                    username,
                } => {
                    m.sender == *student_id
                        || usernames_match(&m.sender_name, username)
                        || m.recipient.as_deref() == Some(student_id.as_str())
                }
            })
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by_key(|m| m.timestamp);
        Ok(out)
    }
}
