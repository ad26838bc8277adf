//! Event-channel wire protocol.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": { ... }}` with
//! camelCase payload fields. [`ClientEvent`] covers what a browser sends,
//! [`ServerEvent`] what the server pushes back.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::chat::{ChatMessage, MessageKind, Student};
use crate::error::CoreError;
use crate::identity::is_valid_session_code;
use crate::roles::Role;
use crate::types::{PersistentId, SessionId, Timestamp};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// An event received from a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    SendMessage(SendMessage),
    Typing(Typing),
    SelectStudent(SelectStudent),
    KickStudent(KickStudent),
    LeaveRoom(LeaveRoom),
}

impl ClientEvent {
    /// Parse one text frame. Malformed frames are validation errors.
    pub fn decode(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Malformed event: {e}")))
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::SelectStudent(_) => "select_student",
            ClientEvent::KickStudent(_) => "kick_student",
            ClientEvent::LeaveRoom(_) => "leave_room",
        }
    }
}

fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    if is_valid_session_code(code) {
        Ok(())
    } else {
        Err(ValidationError::new("session_code"))
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[validate(custom(function = "validate_session_code"))]
    pub session_id: SessionId,
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub username: String,
    pub role: Role,
    #[serde(default, alias = "studentId")]
    pub persistent_student_id: Option<PersistentId>,
}

/// The message body inside a `send_message` event.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(default)]
    pub id: Option<String>,
    /// Display name override. Only honoured for AI-assistant relays.
    #[serde(default)]
    pub sender: Option<String>,
    #[validate(length(min = 1), custom(function = "validate_not_blank"))]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[validate(length(min = 1))]
    pub session_id: SessionId,
    #[validate(nested)]
    pub message: OutgoingMessage,
    #[serde(default)]
    pub recipient: Option<PersistentId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub session_id: SessionId,
    #[serde(default)]
    pub username: String,
    pub is_typing: bool,
    #[serde(default)]
    pub recipient: Option<PersistentId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectStudent {
    pub session_id: SessionId,
    /// Persistent id or connection id of the student.
    pub student_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickStudent {
    pub session_id: SessionId,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub persistent_id: Option<PersistentId>,
}

impl KickStudent {
    /// The key to resolve the target by, persistent id first.
    pub fn target(&self) -> Option<&str> {
        self.persistent_id
            .as_deref()
            .or(self.student_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub session_id: SessionId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An event pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Message(ChatMessage),
    ChatHistory(Vec<ChatMessage>),
    StudentList(Vec<Student>),
    StudentChatHistory {
        student_id: String,
        chat: Vec<ChatMessage>,
    },
    UserTyping {
        username: String,
        is_typing: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        student_id: Option<PersistentId>,
    },
    StudentKicked {
        student_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    KickedFromSession {
        message: String,
    },
    SessionJoined {
        session_id: SessionId,
        role: Role,
        student_id: Option<PersistentId>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
