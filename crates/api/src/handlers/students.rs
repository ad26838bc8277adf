//! Teacher-scoped student endpoints.
//!
//! Both require `?role=teacher`; anything else is 403.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use classchat_core::error::CoreError;
use classchat_core::types::SessionId;
use classchat_db::MessageFilter;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, RoleParams};
use crate::state::AppState;

async fn ensure_session_exists(state: &AppState, id: &str) -> AppResult<()> {
    state
        .store
        .get_session(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Session",
                id: id.to_string(),
            })
        })
}

/// GET /api/v1/sessions/{id}/students?role=teacher
///
/// Every student of the session, offline ones included, in join order.
pub async fn list_students(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(params): Query<RoleParams>,
) -> AppResult<impl IntoResponse> {
    params.require_teacher()?;
    ensure_session_exists(&state, &session_id).await?;

    let students = state.store.list_students(&session_id, true).await?;

    Ok(Json(DataResponse { data: students }))
}

/// GET /api/v1/sessions/{id}/students/{student_id}/messages?role=teacher
///
/// Full message history involving one student: sent by them, sent under
/// their display name, or addressed to them.
pub async fn student_messages(
    State(state): State<AppState>,
    Path((session_id, student_id)): Path<(SessionId, String)>,
    Query(params): Query<RoleParams>,
) -> AppResult<impl IntoResponse> {
    params.require_teacher()?;

    let student = state
        .store
        .find_student(&session_id, &student_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Student",
                id: student_id.clone(),
            })
        })?;

    let messages = state
        .store
        .list_messages(
            &session_id,
            &MessageFilter::InvolvingStudent {
                student_id: student.id,
                username: student.username,
            },
        )
        .await?;

    Ok(Json(DataResponse { data: messages }))
}
