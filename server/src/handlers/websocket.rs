//! WebSocket handler for pokes and socket-borne push/pull.
//!
//! Each connection subscribes to exactly one space. Outgoing messages, both
//! replies and pokes, go through the subscriber's channel so that a single
//! task owns the socket's write half.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use stow_engine::{PullRequest, PushRequest, PushResponse};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::websocket::{ClientMessage, ServerMessage};
use crate::AppState;

use super::{handle_pull, process_push};

/// Serve an upgraded connection until the client goes away.
pub async fn handle_websocket_connection(
    socket: WebSocket,
    state: AppState,
    space_id: String,
    principal: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let subscription_id = state.notifier.subscribe(&space_id, tx);

    tracing::info!(
        subscription_id = %subscription_id,
        space_id = %space_id,
        principal = %principal,
        "WebSocket client connected"
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response =
                    process_message(&text, &state, &space_id, &principal, &subscription_id).await;
                state.notifier.send_to(&subscription_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(subscription_id = %subscription_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(subscription_id = %subscription_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    state.notifier.unsubscribe(&subscription_id);
    send_task.abort();

    tracing::info!(
        subscription_id = %subscription_id,
        space_id = %space_id,
        active_subscribers = state.notifier.subscriber_count(),
        "WebSocket client disconnected"
    );
}

/// Handle one client message and produce the reply.
async fn process_message(
    text: &str,
    state: &AppState,
    space_id: &str,
    principal: &str,
    subscription_id: &str,
) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    match client_msg {
        ClientMessage::Pull {
            client_group_id,
            cookie,
            request_id,
        } => {
            let request = PullRequest {
                client_group_id,
                cookie,
            };
            match handle_pull(state, space_id, principal, request).await {
                Ok(response) => ServerMessage::PullResponse {
                    response,
                    request_id,
                },
                Err(e) => ServerMessage::error(e.to_string(), request_id),
            }
        }

        ClientMessage::Push {
            client_group_id,
            mutations,
            request_id,
        } => {
            let request = PushRequest {
                client_group_id,
                mutations,
            };
            let outcome = match process_push(state, space_id, principal, &request).await {
                Ok(outcome) => outcome,
                Err(e) => return ServerMessage::error(e.to_string(), request_id),
            };

            if outcome.applied > 0 {
                let poked = state.notifier.notify_except(space_id, subscription_id);
                tracing::debug!(poked, applied = outcome.applied, "Poked other subscribers");
            }

            let response = match outcome.into_response() {
                Ok(response) => response,
                Err(AppError::ClientStateNotFound) => PushResponse::client_state_not_found(),
                Err(e) => return ServerMessage::error(e.to_string(), request_id),
            };
            ServerMessage::PushResponse {
                response,
                request_id,
            }
        }

        ClientMessage::Ping => ServerMessage::Pong,
    }
}
