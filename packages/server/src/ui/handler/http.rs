//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
};

use crate::{
    infrastructure::dto::{
        http::{HistoryQuery, MeResponse, MessagesResponse, RoomSummaryDto},
        websocket::{MessageDto, UserDto},
    },
    ui::state::AppState,
    usecase::{AuthenticateUseCase, FetchHistoryUseCase, HistoryError, HistoryRequest},
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "token";

/// Extract the session token from `Authorization: Bearer` or the `token` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Identity of the caller
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, StatusCode> {
    let token = session_token(&headers);
    let user = AuthenticateUseCase::new(state.identity.clone())
        .execute(token.as_deref())
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(MeResponse {
        user: UserDto::from(&user),
    }))
}

/// Message history: `?room=<key>` or `?receiverId=<id>`
///
/// Failures answer with an empty list and an error status.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<MessagesResponse>) {
    let token = session_token(&headers);
    let usecase = FetchHistoryUseCase::new(state.identity.clone(), state.messages.clone());
    let request = HistoryRequest {
        room: query.room,
        receiver_id: query.receiver_id,
    };

    match usecase.execute(token.as_deref(), request).await {
        Ok(messages) => (
            StatusCode::OK,
            Json(MessagesResponse {
                messages: messages.iter().map(MessageDto::from).collect(),
            }),
        ),
        Err(e) => {
            let status = match &e {
                HistoryError::Unauthenticated => StatusCode::UNAUTHORIZED,
                HistoryError::Validation(_) => StatusCode::BAD_REQUEST,
                HistoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status.is_server_error() {
                tracing::error!("History query failed: {}", e);
            } else {
                tracing::warn!("Rejected history query: {}", e);
            }
            (status, Json(MessagesResponse::default()))
        }
    }
}

/// Active rooms and their subscriber counts
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let rooms = state
        .registry
        .active_rooms()
        .await
        .into_iter()
        .map(|(room, subscribers)| RoomSummaryDto {
            room: room.into_string(),
            subscribers,
        })
        .collect();
    Json(rooms)
}
