//! Server-level errors.

use thiserror::Error;

use crate::infrastructure::repository::SeedError;

/// Errors that stop the server from starting or serving
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
