use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use ollqd_core::ChatFrame;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infra::app_state::AppState;

/// Handle WebSocket upgrade request
pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bridge one WebSocket to the chat backend until either side closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = state.chat_connections.open();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ChatFrame>(64);
    info!(connection_id = %connection.id, "chat connection opened");

    // Spawn task to handle outgoing frames
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!("failed to encode chat frame: {err}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        if let Err(err) = ws_sender.close().await {
            debug!("websocket close failed: {err}");
        }
    });

    let inbound = async_stream::stream! {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => yield text.as_str().to_owned(),
                Ok(Message::Binary(bin)) => yield String::from_utf8_lossy(&bin).into_owned(),
                Ok(Message::Close(_)) => break,
                // Ping/pong are answered by the transport
                Ok(_) => {}
                Err(err) => {
                    debug!("websocket read failed: {err}");
                    break;
                }
            }
        }
    };

    let exchanges = state
        .chat
        .serve(inbound, tx, connection.scope.clone())
        .await;

    let open_ms = state
        .chat_connections
        .close(&connection.id)
        .map(|open_for| open_for.num_milliseconds());
    if let Err(err) = writer.await {
        warn!("chat writer task failed: {err}");
    }
    info!(connection_id = %connection.id, exchanges, ?open_ms, "chat connection closed");
}
