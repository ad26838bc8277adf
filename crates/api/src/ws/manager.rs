use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use classchat_core::protocol::ServerEvent;
use classchat_core::types::{ConnectionId, Timestamp};
use tokio::sync::{mpsc, RwLock};

use crate::chat::ConnectionState;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Where this connection is in the join/leave lifecycle.
    pub state: ConnectionState,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<ConnectionId, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new, unjoined connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: ConnectionId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            state: ConnectionState::Unjoined,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID, returning its last lifecycle state.
    pub async fn remove(&self, conn_id: &str) -> Option<ConnectionState> {
        let conn = self.connections.write().await.remove(conn_id)?;
        let connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
        tracing::debug!(conn_id = %conn_id, connected_secs, "Connection unregistered");
        Some(conn.state)
    }

    /// Current lifecycle state of a connection, `None` if it is gone.
    pub async fn state(&self, conn_id: &str) -> Option<ConnectionState> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(|conn| conn.state.clone())
    }

    /// Replace a connection's lifecycle state. Returns `false` if the
    /// connection is gone.
    pub async fn set_state(&self, conn_id: &str, state: ConnectionState) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.state = state;
                true
            }
            None => false,
        }
    }

    /// Move every connection joined to `session_id` to `Left`.
    ///
    /// Returns the affected connection ids.
    pub async fn leave_session(&self, session_id: &str) -> Vec<ConnectionId> {
        let mut conns = self.connections.write().await;
        let mut left = Vec::new();
        for (conn_id, conn) in conns.iter_mut() {
            if matches!(&conn.state, ConnectionState::Joined(m) if m.session_id == session_id) {
                conn.state = ConnectionState::Left;
                left.push(conn_id.clone());
            }
        }
        left
    }

    /// Returns `true` if the connection is still registered.
    pub async fn is_connected(&self, conn_id: &str) -> bool {
        self.connections.read().await.contains_key(conn_id)
    }

    /// Send a raw frame to one connection.
    ///
    /// Returns `false` if the connection is unknown or its channel is
    /// closed; the frame is dropped, not queued.
    pub async fn send(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Encode and send a protocol event to one connection.
    pub async fn send_event(&self, conn_id: &str, event: &ServerEvent) -> bool {
        match event.encode() {
            Ok(text) => self.send(conn_id, Message::Text(text.into())).await,
            Err(e) => {
                tracing::error!(conn_id = %conn_id, error = %e, "Failed to encode event");
                false
            }
        }
    }

    /// Send a Close frame to one connection and unregister it.
    ///
    /// The socket task notices the closed channel and finishes on its own.
    pub async fn close(&self, conn_id: &str) -> Option<ConnectionState> {
        let conn = self.connections.write().await.remove(conn_id)?;
        let _ = conn.sender.send(Message::Close(None));
        Some(conn.state)
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
