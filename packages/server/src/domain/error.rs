//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// UserId validation error
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    /// UserId too long error
    #[error("UserId cannot exceed {max} characters (got {actual})")]
    UserIdTooLong { max: usize, actual: usize },

    /// RoomKey validation error
    #[error("RoomKey cannot be empty")]
    RoomKeyEmpty,

    /// RoomKey too long error
    #[error("RoomKey cannot exceed {max} characters (got {actual})")]
    RoomKeyTooLong { max: usize, actual: usize },

    /// MessageContent validation error
    #[error("MessageContent cannot be empty")]
    MessageContentEmpty,

    /// MessageContent too long error
    #[error("MessageContent cannot exceed {max} characters (got {actual})")]
    MessageContentTooLong { max: usize, actual: usize },

    /// SessionToken validation error
    #[error("SessionToken cannot be empty")]
    SessionTokenEmpty,

    /// Both a room and a receiver were given
    #[error("a message is addressed to either a room or a receiver, not both")]
    DestinationAmbiguous,

    /// Neither a room nor a receiver was given
    #[error("a message must be addressed to a room or a receiver")]
    DestinationMissing,
}

/// Errors raised by the message store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The sender does not exist in the user directory
    #[error("sender '{0}' does not exist")]
    UnknownSender(String),

    /// The backing store could not complete the operation
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the connection registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live connection with this id
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    /// A connection with this id is already registered
    #[error("connection '{0}' is already registered")]
    DuplicateConnection(String),
}
