//! WebSocket and health endpoints.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use megg_communication::CommandExecutor;
use serde_json::json;

use super::{AppState, Dispatcher};

/// Upgrade to the JSON WebSocket API
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Liveness and link status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "MEGG WebSocket API",
        "websocket_clients": state.broadcaster().observer_count(),
        "arduino_connected": state.engine().is_connected(),
    }))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (observer, mut outbound) = state.broadcaster().register();
    tracing::info!(
        "Client {} connected (total: {})",
        observer,
        state.broadcaster().observer_count()
    );

    let (mut sender, mut receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let dispatcher = Dispatcher::new(state.clone());
    dispatcher.greet(observer);

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatcher.handle(observer, &text).await,
            Ok(Message::Binary(_)) => {
                tracing::debug!("Ignoring binary frame from {}", observer);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Socket error from {}: {}", observer, e);
                break;
            }
        }
    }

    state.broadcaster().unregister(observer);
    writer.abort();
    tracing::info!(
        "Client {} disconnected (remaining: {})",
        observer,
        state.broadcaster().observer_count()
    );
}
