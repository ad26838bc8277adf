//! Classroom chat relay over the WebSocket event channel.
//!
//! Four pieces, leaves first:
//!
//! - [`identity::IdentityResolver`] assigns persistent student ids.
//! - [`presence::PresenceCache`] mirrors rosters, teacher slots and history.
//! - [`routing`] decides who receives each message.
//! - [`lifecycle::ChatService`] dispatches inbound events and drives the
//!   join / leave / kick lifecycle of every connection.

pub mod identity;
pub mod lifecycle;
pub mod presence;
pub mod routing;

use classchat_core::error::CoreError;
use classchat_core::roles::Role;
use classchat_core::types::{PersistentId, SessionId};
use classchat_db::StoreError;

pub use identity::IdentityResolver;
pub use lifecycle::ChatService;
pub use presence::PresenceCache;

/// What a joined connection is to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub session_id: SessionId,
    pub role: Role,
    pub username: String,
    /// Set for students only.
    pub student_id: Option<PersistentId>,
}

/// Lifecycle of a single connection: `Unjoined -> Joined -> Left`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined(Membership),
    /// Left the session or was removed from it. Terminal.
    Left,
}

/// Failure of one inbound event. Reported to the initiating connection
/// only, as a single `error` event.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Join the session before sending events")]
    NotJoined,

    #[error("Failed to join session: {0}")]
    JoinFailed(StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ChatError {
    /// Text shown to the client. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::JoinFailed(_) => "Failed to join session".to_string(),
            ChatError::Storage(_) => "Operation failed, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CoreError> for ChatError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ChatError::Validation(msg),
            CoreError::Forbidden(msg) => ChatError::Forbidden(msg),
            CoreError::NotFound { entity, id } => {
                ChatError::NotFound(format!("{entity} {id} not found"))
            }
        }
    }
}

impl From<validator::ValidationErrors> for ChatError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ChatError::Validation(format!("Invalid payload: {errors}"))
    }
}
