//! Hiroba terminal chat client.
//!
//! [`session::ChatSession`] keeps the timeline of the selected conversation,
//! unread counts for the others and pending acknowledgements. The runner wires
//! it to the broker over WebSocket and to the history endpoints over HTTP.

pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod notifier;
pub mod runner;
pub mod session;
pub mod transport;

pub use runner::run as run_client;
