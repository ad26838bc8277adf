//! Handlers for session creation, status and shutdown.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use classchat_core::chat::{Session, SessionStatus};
use classchat_core::error::CoreError;
use classchat_core::types::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/sessions`. May be omitted entirely.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub teacher_id: Option<String>,
}

/// Status view of a session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub id: SessionId,
    pub status: SessionStatus,
    pub active: bool,
    pub created_at: Timestamp,
}

impl From<Session> for SessionStatusResponse {
    fn from(session: Session) -> Self {
        Self {
            active: session.is_active(),
            id: session.id,
            status: session.status,
            created_at: session.created_at,
        }
    }
}

fn session_not_found(id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Session",
        id: id.to_string(),
    })
}

/// POST /api/v1/sessions
///
/// Create a session with a fresh five-digit code.
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> AppResult<impl IntoResponse> {
    let input = body.map(|Json(input)| input).unwrap_or_default();
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state.store.create_session(input.teacher_id.as_deref()).await?;

    tracing::info!(session_id = %session.id, teacher_id = ?session.teacher_id, "Session created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: session })))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> AppResult<impl IntoResponse> {
    let session = state
        .store
        .get_session(&id)
        .await?
        .ok_or_else(|| session_not_found(&id))?;

    Ok(Json(DataResponse {
        data: SessionStatusResponse::from(session),
    }))
}

/// POST /api/v1/sessions/{id}/end
///
/// Mark the session inactive and drop its cached presence. Connected
/// clients stay connected; new joins are refused.
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> AppResult<impl IntoResponse> {
    if !state.chat.end_session(&id).await? {
        return Err(session_not_found(&id));
    }
    let session = state
        .store
        .get_session(&id)
        .await?
        .ok_or_else(|| session_not_found(&id))?;

    Ok(Json(DataResponse {
        data: SessionStatusResponse::from(session),
    }))
}
