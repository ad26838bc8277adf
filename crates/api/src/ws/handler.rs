use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// its text frames are fed to the chat dispatcher.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Dispatches inbound text frames in order on the current task.
///   4. Runs the chat disconnect flow when the stream ends.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = state.ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink. Ends
    // when the manager drops the connection (kick, shutdown) or the sink
    // fails.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: process inbound frames until the client goes away or
    // the server closes the connection.
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.chat.handle_frame(&conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    // Clean up: run the departure flow and stop the sender task.
    state.chat.disconnect(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
