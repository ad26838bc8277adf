pub mod health;
pub mod sessions;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                              WebSocket event channel
///
/// /sessions                                        create (POST)
/// /sessions/{id}                                   status (GET)
/// /sessions/{id}/end                               end (POST)
/// /sessions/{id}/students                          list (?role=teacher)
/// /sessions/{id}/students/{student_id}/messages    history (?role=teacher)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/sessions", sessions::router())
}
