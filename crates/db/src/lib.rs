//! Durable storage for sessions, students and messages.
//!
//! The PostgreSQL side is a set of zero-sized repositories over a `PgPool`.
//! The rest of the system talks to storage through the [`ChatStore`] trait,
//! implemented by [`PgChatStore`] and by the in-memory [`MemoryStore`].

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use store::{ChatStore, MessageFilter, PgChatStore};

pub type DbPool = sqlx::PgPool;

/// Errors returned by every [`ChatStore`] operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored row: {0}")]
    InvalidRow(#[from] classchat_core::error::CoreError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
