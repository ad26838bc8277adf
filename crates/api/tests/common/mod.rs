#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Method, Request, Response};
use axum::Router;
use classchat_api::config::ServerConfig;
use classchat_api::router::build_app_router;
use classchat_api::state::AppState;
use classchat_db::{ChatStore, MemoryStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        heartbeat_interval_secs: 30,
        database_url: None,
    }
}

/// Application state over a fresh in-memory store.
pub fn test_state() -> AppState {
    let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::new());
    AppState::new(store, test_config())
}

/// Build the full application router with all middleware layers.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

/// Send a GET request through the router.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request, with a JSON body when `body` is given.
pub async fn post_json(app: Router, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(Method::POST).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Collect and parse a JSON response body.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create an active session directly in the store.
pub async fn create_session(state: &AppState) -> String {
    state.store.create_session(None).await.unwrap().id
}

/// A registered connection whose outbound frames can be inspected.
pub struct Client {
    pub conn_id: String,
    rx: UnboundedReceiver<Message>,
}

impl Client {
    pub async fn connect(state: &AppState, conn_id: &str) -> Self {
        let rx = state.ws_manager.add(conn_id.to_string()).await;
        Self {
            conn_id: conn_id.to_string(),
            rx,
        }
    }

    /// Send one inbound event through the dispatcher.
    pub async fn emit(&self, state: &AppState, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        state.chat.handle_frame(&self.conn_id, &frame).await;
    }

    /// Join `session_id` and discard the join replies.
    pub async fn join(&mut self, state: &AppState, session_id: &str, username: &str, role: &str) {
        self.emit(
            state,
            "join_room",
            json!({ "sessionId": session_id, "username": username, "role": role }),
        )
        .await;
        self.drain();
    }

    /// Every frame queued so far, decoded. Close frames appear as
    /// `{"event": "close"}`.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            events.push(decode(msg));
        }
        events
    }

    /// Queued events named `name`.
    pub fn events(&mut self, name: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|e| e["event"] == name)
            .map(|e| e["data"].clone())
            .collect()
    }
}

fn decode(msg: Message) -> Value {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        Message::Close(_) => json!({ "event": "close" }),
        other => json!({ "event": "other", "data": format!("{other:?}") }),
    }
}

/// Names of the events in `events`, in order.
pub fn names(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["event"].as_str().unwrap_or_default().to_string())
        .collect()
}
