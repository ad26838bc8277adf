//! Sessions, students and messages as the rest of the system sees them.
//!
//! These are the authoritative shapes: the storage layer converts its rows
//! into them and the event channel serializes them as camelCase JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::new_message_id;
use crate::roles::Role;
use crate::types::{ConnectionId, PersistentId, SessionId, Timestamp};

// ---------------------------------------------------------------------------
// Sender constants
// ---------------------------------------------------------------------------

/// Sender field of server-generated notifications.
pub const SYSTEM_SENDER: &str = "system";

/// Display name of server-generated notifications.
pub const SYSTEM_SENDER_NAME: &str = "System";

/// Sender field of messages relayed from the AI assistant.
pub const AI_SENDER: &str = "ai-assistant";

/// Outward-facing sender label students see on teacher messages.
pub const TEACHER_LABEL: &str = "teacher";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "inactive" => Ok(SessionStatus::Inactive),
            other => Err(CoreError::Validation(format!(
                "Unknown session status '{other}'"
            ))),
        }
    }
}

/// A numbered chat room created by a teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub created_at: Timestamp,
    pub status: SessionStatus,
    pub teacher_id: Option<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Student
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Online,
    Active,
    Offline,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Online => "online",
            StudentStatus::Active => "active",
            StudentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(StudentStatus::Online),
            "active" => Ok(StudentStatus::Active),
            "offline" => Ok(StudentStatus::Offline),
            other => Err(CoreError::Validation(format!(
                "Unknown student status '{other}'"
            ))),
        }
    }
}

/// A student's record within one session. Also the roster snapshot shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Persistent identifier, stable across reconnects.
    pub id: PersistentId,
    pub session_id: SessionId,
    pub username: String,
    pub status: StudentStatus,
    pub last_active: Timestamp,
    /// Connection the student was last seen on. Stale while offline.
    pub connection_id: Option<ConnectionId>,
}

impl Student {
    /// Returns `true` if `key` is this student's persistent id or current
    /// connection id.
    pub fn matches_key(&self, key: &str) -> bool {
        self.id == key || self.connection_id.as_deref() == Some(key)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Message,
    Notification,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::Notification => "notification",
        }
    }
}

impl FromStr for MessageKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(MessageKind::Message),
            "notification" => Ok(MessageKind::Notification),
            other => Err(CoreError::Validation(format!(
                "Unknown message type '{other}'"
            ))),
        }
    }
}

/// A stored chat message. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub session_id: SessionId,
    /// Persistent student id, a teacher connection id, [`SYSTEM_SENDER`] or
    /// [`AI_SENDER`].
    pub sender: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub role: Role,
    /// Persistent id of the addressed student. `None` means broadcast.
    pub recipient: Option<PersistentId>,
}

impl ChatMessage {
    /// Build a server-generated broadcast notification.
    pub fn system_notice(session_id: impl Into<SessionId>, text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            session_id: session_id.into(),
            sender: SYSTEM_SENDER.to_string(),
            sender_name: SYSTEM_SENDER_NAME.to_string(),
            text: text.into(),
            timestamp: crate::types::now(),
            kind: MessageKind::Notification,
            role: Role::System,
            recipient: None,
        }
    }

    /// Returns `true` if this message came from the AI assistant.
    pub fn is_from_ai(&self) -> bool {
        self.role == Role::Ai || self.sender == AI_SENDER
    }

    /// Copy of this message with the outward-facing sender replaced.
    pub fn with_sender(&self, sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..self.clone()
        }
    }
}
