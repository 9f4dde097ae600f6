//! Domain layer for the messaging core.
//!
//! This module contains business logic that is independent of
//! data transfer objects (DTOs) and infrastructure concerns.

pub mod entity;
pub mod error;
pub mod factory;
pub mod repository;
pub mod value_object;

pub use entity::{
    ConnectionSnapshot, ConnectionState, Destination, FanOut, JoinOutcome, MembershipPolicy, Message,
    NewMessage, User,
};
pub use error::{RegistryError, RepositoryError, ValueObjectError};
pub use factory::{ConnectionIdFactory, MessageIdFactory};
pub use repository::{
    ConnectionRegistry, IdentityResolver, MessageRepository, Outbox, UserRepository,
};
pub use value_object::{
    ConnectionId, MessageContent, MessageId, RoomKey, SessionToken, Timestamp, UserId,
};

#[cfg(test)]
pub use repository::{MockIdentityResolver, MockMessageRepository, MockUserRepository};
