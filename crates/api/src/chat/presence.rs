//! In-memory mirror of each session's live roster, teacher slot and
//! message history.
//!
//! Storage stays authoritative. Entries are created on first access and
//! hydrated from the store only while empty, so a reload never clobbers
//! updates made since. No lock is held across a storage call; concurrent
//! writers are last-write-wins per student id.

use std::collections::HashMap;
use std::sync::Arc;

use classchat_core::chat::{ChatMessage, Student};
use classchat_core::types::{ConnectionId, SessionId};
use classchat_db::{ChatStore, MessageFilter, StoreError};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct SessionEntry {
    students: Vec<Student>,
    history: Vec<ChatMessage>,
    teacher: Option<ConnectionId>,
}

/// Per-process presence cache shared by every connection handler.
pub struct PresenceCache {
    store: Arc<dyn ChatStore>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl PresenceCache {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Roster of a session, hydrated from storage if the cached one is empty.
    ///
    /// Offline students are not part of the live roster. On a storage
    /// error nothing is cached, so the next call retries.
    pub async fn load_students(&self, session_id: &str) -> Result<Vec<Student>, StoreError> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            if !entry.students.is_empty() {
                return Ok(entry.students.clone());
            }
        }

        let fetched = self.store.list_students(session_id, false).await?;

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_default();
        if entry.students.is_empty() {
            entry.students = fetched;
        }
        Ok(entry.students.clone())
    }

    /// Full message history of a session, hydrated like
    /// [`load_students`](Self::load_students).
    pub async fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            if !entry.history.is_empty() {
                return Ok(entry.history.clone());
            }
        }

        let fetched = self
            .store
            .list_messages(session_id, &MessageFilter::All)
            .await?;

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_default();
        if entry.history.is_empty() {
            entry.history = fetched;
        }
        Ok(entry.history.clone())
    }

    /// Cached roster without hydration.
    pub async fn roster(&self, session_id: &str) -> Vec<Student> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.students.clone())
            .unwrap_or_default()
    }

    /// Insert a student or replace the cached snapshot with the same id.
    pub async fn upsert_student(&self, student: Student) {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(student.session_id.clone()).or_default();
        match entry.students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => *existing = student,
            None => entry.students.push(student),
        }
    }

    /// Drop a student from the roster, returning the removed snapshot.
    pub async fn remove_student(&self, session_id: &str, student_id: &str) -> Option<Student> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        let pos = entry.students.iter().position(|s| s.id == student_id)?;
        Some(entry.students.remove(pos))
    }

    /// Find a cached student by persistent id or connection id.
    pub async fn find_student(&self, session_id: &str, key: &str) -> Option<Student> {
        let sessions = self.sessions.read().await;
        let students = &sessions.get(session_id)?.students;
        students
            .iter()
            .find(|s| s.id == key)
            .or_else(|| students.iter().find(|s| s.matches_key(key)))
            .cloned()
    }

    /// Append a persisted message to the cached history.
    ///
    /// A history that was never hydrated stays empty, so the next load
    /// fetches the full history (this message included) from storage.
    pub async fn append_message(&self, msg: ChatMessage) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&msg.session_id) {
            if !entry.history.is_empty() {
                entry.history.push(msg);
            }
        }
    }

    /// Bind the teacher slot to `conn_id`, returning the previous holder.
    pub async fn set_teacher(&self, session_id: &str, conn_id: &str) -> Option<ConnectionId> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .teacher
            .replace(conn_id.to_string())
    }

    /// Current teacher connection of a session, if any.
    pub async fn teacher(&self, session_id: &str) -> Option<ConnectionId> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|entry| entry.teacher.clone())
    }

    /// Clear the teacher slot if `conn_id` still holds it.
    ///
    /// Returns `false` when a newer teacher connection has taken the slot.
    pub async fn clear_teacher_if(&self, session_id: &str, conn_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(entry) if entry.teacher.as_deref() == Some(conn_id) => {
                entry.teacher = None;
                true
            }
            _ => false,
        }
    }

    /// Forget everything cached for a session.
    pub async fn clear_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Drop a session's entry once it has no teacher and no live students.
    ///
    /// Returns `true` if the entry was evicted. The history is reloaded from
    /// storage by the next join.
    pub async fn evict_if_idle(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let idle = sessions
            .get(session_id)
            .is_some_and(|entry| entry.teacher.is_none() && entry.students.is_empty());
        if idle {
            sessions.remove(session_id);
        }
        idle
    }

    /// Number of sessions with a cached entry.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
