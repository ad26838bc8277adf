//! Request handlers for the administrative REST surface.
//!
//! Handlers delegate to the [`ChatStore`](classchat_db::ChatStore) held in
//! [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod sessions;
pub mod students;
