//! Persistent student identity.
//!
//! Teachers have no persistent id: their live connection fills the single
//! teacher slot of a session. Students get an id that survives reconnects.

use std::sync::Arc;

use classchat_core::identity::{synthesize_student_id, usernames_match};
use classchat_core::roles::Role;
use classchat_core::types::PersistentId;
use classchat_db::{ChatStore, StoreError};

/// Resolves the persistent id a joining student is bound to.
pub struct IdentityResolver {
    store: Arc<dyn ChatStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Resolve the persistent id for a join.
    ///
    /// 1. Non-students get `None`.
    /// 2. A student already in the session under the same name
    ///    (case-insensitive) gets that student's id, whatever id the client
    ///    supplied. Two people picking the same name share one identity.
    /// 3. Without a supplied id, a fresh id is synthesized.
    /// 4. A supplied id is reused only if it belongs to this session under
    ///    the same username; otherwise a fresh id is synthesized so one
    ///    client cannot take over another student's history.
    pub async fn resolve(
        &self,
        session_id: &str,
        username: &str,
        role: Role,
        supplied: Option<&str>,
    ) -> Result<Option<PersistentId>, StoreError> {
        if role != Role::Student {
            return Ok(None);
        }

        if let Some(existing) = self
            .store
            .find_student_by_username(session_id, username)
            .await?
        {
            tracing::debug!(session_id, student_id = %existing.id, "Rejoin by username");
            return Ok(Some(existing.id));
        }

        let Some(supplied) = supplied.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Some(synthesize_student_id(session_id, username)));
        };

        match self.store.find_student(session_id, supplied).await? {
            Some(owner) if owner.id == supplied && usernames_match(&owner.username, username) => {
                Ok(Some(owner.id))
            }
            Some(owner) => {
                tracing::warn!(
                    session_id,
                    supplied_id = %supplied,
                    owner = %owner.username,
                    "Supplied student id belongs to another username, issuing a fresh id"
                );
                Ok(Some(synthesize_student_id(session_id, username)))
            }
            None => {
                tracing::debug!(session_id, supplied_id = %supplied, "Unknown student id, issuing a fresh id");
                Ok(Some(synthesize_student_id(session_id, username)))
            }
        }
    }
}
