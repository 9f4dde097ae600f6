//! インメモリ実装

pub mod message;
pub mod registry;
pub mod user;

pub use message::InMemoryMessageRepository;
pub use registry::InMemoryConnectionRegistry;
pub use user::{InMemoryUserDirectory, SeedError, UserSeed};
