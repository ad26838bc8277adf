//! Shared response envelope and query types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Use [`DataResponse`]
//! instead of ad-hoc `serde_json::json!({ "data": ... })`.

use classchat_core::error::CoreError;
use classchat_core::roles::Role;
use serde::{Deserialize, Serialize};

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: students }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `?role=` flag carried by teacher-scoped endpoints.
///
/// Kept as a raw string so an unknown role is refused with 403 instead of
/// failing query extraction.
#[derive(Debug, Default, Deserialize)]
pub struct RoleParams {
    pub role: Option<String>,
}

impl RoleParams {
    /// Reject the request unless it carries `role=teacher`.
    pub fn require_teacher(&self) -> Result<(), CoreError> {
        match self.role.as_deref().map(str::parse::<Role>) {
            Some(Ok(Role::Teacher)) => Ok(()),
            _ => Err(CoreError::Forbidden(
                "Only teachers can access this resource".into(),
            )),
        }
    }
}
