pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::ClientMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub username: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let username = match params.username.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            tracing::warn!("Rejecting WebSocket connection without username");
            return (StatusCode::BAD_REQUEST, "username query parameter is required")
                .into_response();
        }
    };

    tracing::info!("WebSocket connection request: username={}", username);

    ws.on_upgrade(move |socket| handle_socket(socket, username, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, username: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = ulid::Ulid::new().to_string();

    // Everything the chat core delivers to this connection lands here
    let mut outbound = state.hub.attach(&connection_id).await;

    if let Err(e) = state.chat.connect(&connection_id, &username).await {
        tracing::error!("Failed to register {}: {}", connection_id, e);
        state.hub.detach(&connection_id).await;
        return;
    }

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                match payload {
                    Some(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received frame from {}: {}", connection_id, text);

                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &connection_id, &state).await
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(format!("Invalid message format: {}", e))
                            }
                        };

                        if let Some(reply) = reply {
                            if sender.send(Message::Text(reply.into())).await.is_err() {
                                tracing::error!("Failed to send reply");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handlers::disconnect(&connection_id, &state).await;

    tracing::info!("WebSocket connection closed for {}", connection_id);
}
