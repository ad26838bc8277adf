use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Spawn a background task that sends a Ping frame to every connected
/// client every `interval_secs` seconds.
///
/// The task runs until aborted through the returned `JoinHandle`, which
/// happens during shutdown.
pub fn start_heartbeat(ws_manager: Arc<WsManager>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            interval.tick().await;
            let count = ws_manager.connection_count().await;
            tracing::trace!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
