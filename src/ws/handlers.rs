//! WebSocket message dispatch
//!
//! Maps a parsed client frame onto the chat flows. The returned string, if
//! any, is sent straight back to the originating socket.

use crate::error::ChatError;
use crate::protocol::ClientMessage;
use crate::state::AppState;
use std::sync::Arc;

/// Handle client messages and return an optional reply for the sender
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<String> {
    match msg {
        ClientMessage::SendNotify => match state.chat.notify(connection_id).await {
            Ok(report) => {
                tracing::info!(
                    "Announced {} to {} connections",
                    connection_id,
                    report.delivered
                );
                None
            }
            Err(e) => Some(error_reply(connection_id, e)),
        },

        ClientMessage::SendMessage { message } => {
            match state.chat.message(connection_id, &message).await {
                Ok(report) => {
                    if !report.pruned.is_empty() {
                        tracing::info!("Pruned {} dead connections", report.pruned.len());
                    }
                    None
                }
                Err(e) => Some(error_reply(connection_id, e)),
            }
        }
    }
}

/// Socket closed: run the leave flow while the connection is still attached,
/// then drop its outbound queue
pub async fn disconnect(connection_id: &str, state: &Arc<AppState>) {
    if let Err(e) = state.chat.leave(connection_id).await {
        tracing::error!("Leave flow failed for {}: {}", connection_id, e);
    }
    state.hub.detach(connection_id).await;
}

fn error_reply(connection_id: &str, error: ChatError) -> String {
    match error {
        ChatError::NotFound(_) => {
            tracing::warn!("Frame from unregistered connection {}", connection_id);
            "You are not registered in the chat room".to_string()
        }
        e => {
            tracing::error!("Chat flow failed for {}: {}", connection_id, e);
            "The chat service is temporarily unavailable".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_from_unregistered_connection_gets_error_reply() {
        let state = Arc::new(AppState::default());

        let reply = handle_message(
            ClientMessage::SendMessage {
                message: "hello".to_string(),
            },
            "ghost",
            &state,
        )
        .await;

        assert_eq!(
            reply.as_deref(),
            Some("You are not registered in the chat room")
        );
    }

    #[tokio::test]
    async fn test_notify_delivers_welcome_over_hub() {
        let state = Arc::new(AppState::default());
        let mut rx = state.hub.attach("abc123=").await;
        state.chat.connect("abc123=", "foo").await.unwrap();

        let reply = handle_message(ClientMessage::SendNotify, "abc123=", &state).await;
        assert!(reply.is_none());

        let welcome = rx.recv().await.unwrap();
        assert!(welcome.starts_with("Welcome to Simple Chat\nThere are 1 users connected."));
        assert_eq!(rx.recv().await.unwrap(), "foo has joined the chat room");
    }

    #[tokio::test]
    async fn test_disconnect_notifies_others_then_detaches() {
        let state = Arc::new(AppState::default());
        let _leaver_rx = state.hub.attach("A").await;
        let mut other_rx = state.hub.attach("B").await;
        state.chat.connect("A", "foo").await.unwrap();
        state.chat.connect("B", "bar").await.unwrap();

        disconnect("A", &state).await;

        assert_eq!(other_rx.recv().await.unwrap(), "foo has left the chat room");
        assert_eq!(state.hub.attached_count().await, 1);
        assert!(matches!(
            state.chat.registry().lookup("A").await,
            Err(ChatError::NotFound(_))
        ));
        assert_eq!(state.chat.registry().lookup("B").await.unwrap(), "bar");
    }

    #[tokio::test]
    async fn test_disconnect_detaches_even_when_store_is_down() {
        let state = Arc::new(AppState::default());
        let _rx = state.hub.attach("A").await;
        state.chat.connect("A", "foo").await.unwrap();
        state.store.set_available(false);

        disconnect("A", &state).await;
        assert_eq!(state.hub.attached_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_outage_gets_generic_reply() {
        let state = Arc::new(AppState::default());
        state.store.set_available(false);

        let reply = handle_message(ClientMessage::SendNotify, "abc123=", &state).await;
        assert_eq!(
            reply.as_deref(),
            Some("The chat service is temporarily unavailable")
        );
    }
}
