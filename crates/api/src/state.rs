use std::sync::Arc;

use classchat_db::ChatStore;

use crate::chat::ChatService;
use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Durable store: PostgreSQL, or in-memory for development.
    pub store: Arc<dyn ChatStore>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Event dispatcher and presence cache for the chat channel.
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Wire the connection manager and chat service around `store`.
    pub fn new(store: Arc<dyn ChatStore>, config: ServerConfig) -> Self {
        let ws_manager = Arc::new(WsManager::new());
        let chat = Arc::new(ChatService::new(
            Arc::clone(&store),
            Arc::clone(&ws_manager),
        ));
        Self {
            store,
            config: Arc::new(config),
            ws_manager,
            chat,
        }
    }
}
