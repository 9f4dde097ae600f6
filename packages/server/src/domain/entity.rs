//! Core domain models for the messaging core.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{
    error::ValueObjectError,
    value_object::{ConnectionId, MessageContent, MessageId, RoomKey, Timestamp, UserId},
};

/// A user known to the identity resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    /// Create a new user record
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Where a message is addressed: a room, or one receiver directly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Room(RoomKey),
    Direct(UserId),
}

impl Destination {
    /// Build a destination from the two optional wire fields.
    ///
    /// Exactly one of `room` and `receiver_id` must be given.
    pub fn from_parts(
        room: Option<String>,
        receiver_id: Option<String>,
    ) -> Result<Self, ValueObjectError> {
        match (room, receiver_id) {
            (Some(_), Some(_)) => Err(ValueObjectError::DestinationAmbiguous),
            (Some(room), None) => Ok(Self::Room(RoomKey::new(room)?)),
            (None, Some(receiver)) => Ok(Self::Direct(UserId::new(receiver)?)),
            (None, None) => Err(ValueObjectError::DestinationMissing),
        }
    }

    /// The room, for room-scoped messages.
    pub fn room(&self) -> Option<&RoomKey> {
        match self {
            Self::Room(room) => Some(room),
            Self::Direct(_) => None,
        }
    }

    /// The receiver, for direct messages.
    pub fn receiver(&self) -> Option<&UserId> {
        match self {
            Self::Room(_) => None,
            Self::Direct(receiver) => Some(receiver),
        }
    }
}

/// A validated message that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub content: MessageContent,
    pub destination: Destination,
}

impl NewMessage {
    /// Create a new unpersisted message
    pub fn new(sender_id: UserId, content: MessageContent, destination: Destination) -> Self {
        Self {
            sender_id,
            content,
            destination,
        }
    }
}

/// A persisted, immutable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the store
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub destination: Destination,
    /// Timestamp assigned by the store, non-decreasing in append order
    pub created_at: Timestamp,
    /// Sender display name resolved at persist/query time
    pub sender_name: String,
}

impl Message {
    /// Whether `user_id` authored or directly receives this message
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.sender_id == user_id || self.destination.receiver() == Some(user_id)
    }
}

/// Lifecycle of one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// Transport handshake done, private channel not subscribed
    Connected,
    /// Subscribed to the user's private channel
    Registered,
    /// Transport closed; all memberships discarded
    Disconnected,
}

/// How joining a room interacts with rooms joined earlier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipPolicy {
    /// Every room ever joined stays subscribed until disconnect
    #[default]
    Cumulative,
    /// Joining a room leaves all other rooms
    Exclusive,
}

impl FromStr for MembershipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cumulative" => Ok(Self::Cumulative),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(format!(
                "unknown membership policy '{other}' (expected 'cumulative' or 'exclusive')"
            )),
        }
    }
}

impl fmt::Display for MembershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cumulative => f.write_str("cumulative"),
            Self::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Point-in-time view of a connection held by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    /// Identity resolved at connect time, if any
    pub identity: Option<UserId>,
    pub state: ConnectionState,
    pub rooms: BTreeSet<RoomKey>,
    pub connected_at: Timestamp,
}

/// Result of a join request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    /// false when the connection was already a member
    pub newly_joined: bool,
    /// Rooms left because of [`MembershipPolicy::Exclusive`]
    pub left: Vec<RoomKey>,
}

/// Result of broadcasting one persisted message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Resolved recipients, repeated once per channel they were reached through
    pub targets: Vec<ConnectionId>,
    /// Frames actually queued
    pub delivered: usize,
}
