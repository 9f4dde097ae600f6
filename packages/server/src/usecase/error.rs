//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{RegistryError, RepositoryError, ValueObjectError};

/// 接続確立のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// join-room / register-user のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValueObjectError),

    /// 匿名接続はユーザーチャンネルを購読できない
    #[error("connection has no resolved identity")]
    Unauthenticated,

    #[error("connection is authenticated as '{identity}', not '{requested}'")]
    IdentityMismatch { identity: String, requested: String },

    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),
}

impl From<RegistryError> for SubscriptionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ConnectionNotFound(id) | RegistryError::DuplicateConnection(id) => {
                Self::ConnectionNotFound(id)
            }
        }
    }
}

/// send-message のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    #[error("invalid message: {0}")]
    Validation(#[from] ValueObjectError),

    #[error("senderId is required")]
    MissingSender,

    /// 匿名接続は送信者として永続化できない
    #[error("connection has no resolved identity")]
    Unauthenticated,

    #[error("connection is authenticated as '{identity}', cannot send as '{sender}'")]
    SenderMismatch { identity: String, sender: String },

    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("failed to persist message: {0}")]
    Storage(#[from] RepositoryError),
}

/// 履歴取得のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("session is missing or invalid")]
    Unauthenticated,

    #[error("invalid query: {0}")]
    Validation(#[from] ValueObjectError),

    #[error("failed to read history: {0}")]
    Storage(#[from] RepositoryError),
}
