//! WebSocket connection handlers.
//!
//! One task reads frames from the socket and dispatches them in arrival
//! order; another drains the connection's outbox into the socket. Broadcasts
//! from other connections reach this socket through the outbox.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, Outbox, User},
    infrastructure::dto::websocket::{
        ClientEvent, ErrorCode, SendMessagePayload, ServerEvent, UserDto,
    },
    ui::{
        handler::http::session_token,
        state::{AppState, ConnectQuery},
    },
    usecase::{
        AuthenticateUseCase, CloseConnectionUseCase, JoinRoomUseCase, OpenConnectionUseCase,
        RegisterUserUseCase, SendMessageCommand, SendMessageError, SendMessageUseCase,
        SubscriptionError,
    },
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = query.token.or_else(|| session_token(&headers));
    let identity = AuthenticateUseCase::new(state.identity.clone())
        .execute(token.as_deref())
        .await;

    match &identity {
        Some(user) => tracing::info!("WebSocket upgrade for user '{}'", user.id),
        None => tracing::info!("WebSocket upgrade for anonymous client"),
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Option<User>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let connection_id = match OpenConnectionUseCase::new(state.registry.clone())
        .execute(identity.as_ref(), tx.clone())
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to register connection: {}", e);
            return;
        }
    };
    tracing::info!("Connection '{}' opened", connection_id);

    reply(
        &tx,
        &ServerEvent::Connected {
            connection_id: connection_id.to_string(),
            user: identity.as_ref().map(UserDto::from),
        },
    );

    // Spawn a task to drain the outbox into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Spawn a task to receive frames from this client
    let recv_state = state.clone();
    let recv_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", recv_connection_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received frame from '{}': {}", recv_connection_id, text);
                    handle_frame(&recv_state, &recv_connection_id, &tx, text.as_str()).await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", recv_connection_id);
                    break;
                }
                // Ping/pong is handled automatically by the WebSocket protocol
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    match CloseConnectionUseCase::new(state.registry.clone())
        .execute(&connection_id)
        .await
    {
        Ok(snapshot) => tracing::info!(
            "Connection '{}' closed (left {} rooms)",
            connection_id,
            snapshot.rooms.len()
        ),
        Err(e) => tracing::warn!("Failed to close connection '{}': {}", connection_id, e),
    }
}

/// Dispatch one inbound text frame.
async fn handle_frame(state: &AppState, connection_id: &ConnectionId, outbox: &Outbox, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Unparseable frame from '{}': {}", connection_id, e);
            reply(
                outbox,
                &ServerEvent::Error {
                    request_id: None,
                    code: ErrorCode::Protocol,
                    reason: format!("unparseable frame: {e}"),
                },
            );
            return;
        }
    };

    match event {
        ClientEvent::JoinRoom { room } => {
            let usecase = JoinRoomUseCase::new(state.registry.clone());
            match usecase.execute(connection_id, room).await {
                Ok((room, outcome)) => {
                    if outcome.newly_joined {
                        tracing::info!("Connection '{}' joined room '{}'", connection_id, room);
                    }
                    reply(
                        outbox,
                        &ServerEvent::RoomJoined {
                            room: room.into_string(),
                            left: outcome.left.into_iter().map(|r| r.into_string()).collect(),
                        },
                    );
                }
                Err(e) => reject_subscription(outbox, connection_id, &e),
            }
        }
        ClientEvent::RegisterUser { user_id } => {
            let usecase = RegisterUserUseCase::new(state.registry.clone());
            match usecase.execute(connection_id, user_id).await {
                Ok((user_id, _)) => {
                    tracing::info!("Connection '{}' registered as '{}'", connection_id, user_id);
                    reply(
                        outbox,
                        &ServerEvent::UserRegistered {
                            user_id: user_id.into_string(),
                        },
                    );
                }
                Err(e) => reject_subscription(outbox, connection_id, &e),
            }
        }
        ClientEvent::SendMessage(payload) => send_message(state, connection_id, outbox, payload).await,
    }
}

/// Persist, broadcast, then acknowledge.
async fn send_message(
    state: &AppState,
    connection_id: &ConnectionId,
    outbox: &Outbox,
    payload: SendMessagePayload,
) {
    let request_id = payload.request_id;
    let command = SendMessageCommand {
        content: payload.content,
        sender_id: payload.sender_id,
        room: payload.room,
        receiver_id: payload.receiver_id,
    };

    let usecase = SendMessageUseCase::new(
        state.messages.clone(),
        state.registry.clone(),
        state.publish_order.clone(),
    );
    let outcome = match usecase.execute(connection_id, command).await {
        Ok(outcome) => outcome,
        Err(e) => {
            match &e {
                SendMessageError::Storage(_) => {
                    tracing::error!("Failed to persist message from '{}': {}", connection_id, e)
                }
                _ => tracing::warn!("Rejected message from '{}': {}", connection_id, e),
            }
            reply(
                outbox,
                &ServerEvent::Error {
                    request_id,
                    code: send_error_code(&e),
                    reason: e.to_string(),
                },
            );
            return;
        }
    };

    tracing::info!(
        "Broadcast message '{}' from '{}' to {}/{} targets",
        outcome.message.id,
        outcome.message.sender_id,
        outcome.delivered,
        outcome.targets.len()
    );

    reply(
        outbox,
        &ServerEvent::Ack {
            request_id,
            message_id: outcome.message.id.to_string(),
        },
    );
}

fn reject_subscription(outbox: &Outbox, connection_id: &ConnectionId, error: &SubscriptionError) {
    tracing::warn!("Rejected subscription from '{}': {}", connection_id, error);
    reply(
        outbox,
        &ServerEvent::Error {
            request_id: None,
            code: subscription_error_code(error),
            reason: error.to_string(),
        },
    );
}

/// Queue a frame for this connection only.
fn reply(outbox: &Outbox, event: &ServerEvent) {
    match event.to_frame() {
        Ok(frame) => {
            // The outbox is closed only once the socket is gone
            let _ = outbox.send(frame);
        }
        Err(e) => tracing::error!("Failed to serialize reply: {}", e),
    }
}

fn send_error_code(error: &SendMessageError) -> ErrorCode {
    match error {
        SendMessageError::Validation(_) | SendMessageError::MissingSender => ErrorCode::Validation,
        SendMessageError::Unauthenticated | SendMessageError::SenderMismatch { .. } => {
            ErrorCode::Auth
        }
        SendMessageError::ConnectionNotFound(_) => ErrorCode::Protocol,
        SendMessageError::Storage(_) => ErrorCode::Storage,
    }
}

fn subscription_error_code(error: &SubscriptionError) -> ErrorCode {
    match error {
        SubscriptionError::Validation(_) => ErrorCode::Validation,
        SubscriptionError::Unauthenticated | SubscriptionError::IdentityMismatch { .. } => {
            ErrorCode::Auth
        }
        SubscriptionError::ConnectionNotFound(_) => ErrorCode::Protocol,
    }
}
