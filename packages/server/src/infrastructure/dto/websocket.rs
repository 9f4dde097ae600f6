//! WebSocket frame DTOs.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "send-message", "requestId": "r1", "content": "hi", "senderId": "u1", "room": "side-talk"}
//! {"type": "new-message", "message": {"id": "...", "content": "hi", "senderId": "u1", ...}}
//! ```

use serde::{Deserialize, Serialize};

use hiroba_shared::time::timestamp_to_jst_rfc3339;

use crate::domain::{Message, User};

/// Display data of a message's author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderDto {
    pub name: String,
}

/// A persisted message as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    /// Set for direct messages only
    pub receiver_id: Option<String>,
    /// Set for room messages only
    pub room: Option<String>,
    /// RFC 3339
    pub created_at: String,
    pub sender: SenderDto,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            content: message.content.to_string(),
            sender_id: message.sender_id.to_string(),
            receiver_id: message.destination.receiver().map(ToString::to_string),
            room: message.destination.room().map(ToString::to_string),
            created_at: timestamp_to_jst_rfc3339(message.created_at.value()),
            sender: SenderDto {
                name: message.sender_name.clone(),
            },
        }
    }
}

/// Public user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Payload of a `send-message` frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    /// Echoed back in the `ack` or `error` answering this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
}

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom {
        room: String,
    },
    #[serde(rename_all = "camelCase")]
    RegisterUser {
        user_id: String,
    },
    SendMessage(SendMessagePayload),
}

/// Machine-readable class of a negative acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Malformed content, sender or destination
    Validation,
    /// The message could not be persisted
    Storage,
    /// Missing or mismatching identity
    Auth,
    /// The frame itself could not be understood
    Protocol,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame of every connection
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: String,
        user: Option<UserDto>,
    },
    RoomJoined {
        room: String,
        /// Rooms left under the exclusive membership policy
        left: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserRegistered {
        user_id: String,
    },
    NewMessage {
        message: MessageDto,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        request_id: Option<String>,
        message_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        request_id: Option<String>,
        code: ErrorCode,
        reason: String,
    },
}

impl ServerEvent {
    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
