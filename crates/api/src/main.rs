use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use classchat_db::{ChatStore, MemoryStore, PgChatStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classchat_api::config::ServerConfig;
use classchat_api::router::build_app_router;
use classchat_api::state::AppState;
use classchat_api::ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classchat_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let store = connect_store(&config).await?;

    // --- App state ---
    let state = AppState::new(store, config.clone());
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), config.heartbeat_interval_secs);

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Connect to PostgreSQL when `DATABASE_URL` is set, otherwise fall back to
/// the in-memory store.
async fn connect_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn ChatStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store (data is lost on restart)");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = classchat_db::create_pool(database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    classchat_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    classchat_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgChatStore::new(pool)))
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
