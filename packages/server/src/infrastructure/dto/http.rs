//! HTTP API request/response DTOs.

use serde::{Deserialize, Serialize};

use super::websocket::{MessageDto, UserDto};

/// Query of the history endpoint: `?room=<key>` or `?receiverId=<id>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub room: Option<String>,
    pub receiver_id: Option<String>,
}

/// History response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageDto>,
}

/// Identity of the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserDto,
}

/// Active room summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub room: String,
    pub subscribers: usize,
}
