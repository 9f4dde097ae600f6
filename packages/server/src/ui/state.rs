//! Shared application state.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    domain::{ConnectionRegistry, IdentityResolver, MembershipPolicy, MessageRepository},
    infrastructure::repository::{
        InMemoryConnectionRegistry, InMemoryMessageRepository, InMemoryUserDirectory,
    },
    usecase::PublishOrder,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Session token; anonymous when absent
    pub token: Option<String>,
}

/// Shared application state
///
/// The broker's membership tables live in `registry`; nothing is global.
pub struct AppState {
    /// Connection / room / user-channel membership
    pub registry: Arc<dyn ConnectionRegistry>,
    /// Message store
    pub messages: Arc<dyn MessageRepository>,
    /// Session token resolution
    pub identity: Arc<dyn IdentityResolver>,
    /// Shared by every connection so broadcasts follow append order
    pub publish_order: PublishOrder,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        messages: Arc<dyn MessageRepository>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            registry,
            messages,
            identity,
            publish_order: PublishOrder::default(),
        }
    }

    /// Wire up the in-memory implementations around a user directory.
    pub fn in_memory(directory: InMemoryUserDirectory, policy: MembershipPolicy) -> Self {
        let directory = Arc::new(directory);
        Self::new(
            Arc::new(InMemoryConnectionRegistry::new(policy)),
            Arc::new(InMemoryMessageRepository::new(directory.clone())),
            directory,
        )
    }
}
