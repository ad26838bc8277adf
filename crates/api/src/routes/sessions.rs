//! Route definitions for sessions and their students.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{sessions, students};
use crate::state::AppState;

/// Session routes mounted at `/sessions`.
///
/// ```text
/// POST   /                                    -> create_session
/// GET    /{id}                                -> get_session
/// POST   /{id}/end                            -> end_session
/// GET    /{id}/students                       -> list_students
/// GET    /{id}/students/{student_id}/messages -> student_messages
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sessions::create_session))
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/end", post(sessions::end_session))
        .route("/{id}/students", get(students::list_students))
        .route(
            "/{id}/students/{student_id}/messages",
            get(students::student_messages),
        )
}
