//! Client error types.

use hiroba_server::domain::ValueObjectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no identity loaded; start the client with a valid --token")]
    NoIdentity,

    #[error("no conversation selected")]
    NoConversation,

    #[error(transparent)]
    Validation(#[from] ValueObjectError),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("line editor error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}
