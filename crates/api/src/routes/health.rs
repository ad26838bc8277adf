use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: &'static str,
}

/// GET /health
///
/// 200 when the store answers, 503 otherwise.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<DataResponse<HealthResponse>>) {
    let (code, status) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        code,
        Json(DataResponse {
            data: HealthResponse {
                status,
                version: env!("CARGO_PKG_VERSION"),
                store: state.store.backend(),
            },
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
