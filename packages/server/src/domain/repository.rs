//! Repository traits.
//!
//! The domain defines what it needs from storage and identity; the
//! infrastructure layer provides the implementations. Use cases depend on these
//! traits only.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::{
    ConnectionId, ConnectionSnapshot, FanOut, JoinOutcome, Message, NewMessage, RegistryError,
    RepositoryError, RoomKey, SessionToken, Timestamp, User, UserId,
};

/// Outbound frame queue of one connection (serialized JSON frames)
pub type Outbox = UnboundedSender<String>;

/// Durable, append-only message log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a message, assigning its id, timestamp and sender display name.
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// All messages of a room, ascending by `created_at`.
    async fn find_by_room(&self, room: &RoomKey) -> Result<Vec<Message>, RepositoryError>;

    /// All messages sent by `user_id` or addressed directly to it, ascending by `created_at`.
    async fn find_by_participant(&self, user_id: &UserId) -> Result<Vec<Message>, RepositoryError>;
}

/// Lookup of user records by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, user_id: &UserId) -> Option<User>;
}

/// Maps a session token to the user it belongs to.
///
/// Fails open: an unknown or invalid token resolves to `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_from_session(&self, token: &SessionToken) -> Option<User>;
}

/// Ephemeral membership tables of the broker.
///
/// Every method is atomic with respect to the others.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Register a new connection in the `Connected` state.
    async fn add_connection(
        &self,
        connection_id: ConnectionId,
        identity: Option<UserId>,
        outbox: Outbox,
        connected_at: Timestamp,
    ) -> Result<(), RegistryError>;

    /// Remove a connection together with all its memberships.
    async fn remove_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<ConnectionSnapshot, RegistryError>;

    async fn get_connection(&self, connection_id: &ConnectionId) -> Option<ConnectionSnapshot>;

    /// Add the connection to a room's broadcast set. Idempotent.
    async fn join_room(
        &self,
        connection_id: &ConnectionId,
        room: RoomKey,
    ) -> Result<JoinOutcome, RegistryError>;

    /// Subscribe the connection to a private user channel. Idempotent.
    ///
    /// Returns false when it was already subscribed.
    async fn subscribe_user(
        &self,
        connection_id: &ConnectionId,
        user_id: UserId,
    ) -> Result<bool, RegistryError>;

    /// Connections currently joined to `room`.
    async fn room_subscribers(&self, room: &RoomKey) -> Vec<ConnectionId>;

    /// Connections currently subscribed to the private channel of `user_id`.
    async fn user_subscribers(&self, user_id: &UserId) -> Vec<ConnectionId>;

    /// Resolve the recipients of `message` and queue its new-message frame.
    ///
    /// Room messages reach every connection joined to the room. Direct
    /// messages reach the sender's channel and then the receiver's, so a
    /// connection on both gets two frames. Recipients are resolved and frames
    /// queued without releasing the membership lock.
    async fn fan_out(&self, message: &Message) -> FanOut;

    /// Active rooms with their subscriber counts, sorted by key.
    async fn active_rooms(&self) -> Vec<(RoomKey, usize)>;

    async fn count_connections(&self) -> usize;
}
