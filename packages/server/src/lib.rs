//! Hiroba chat message broker.
//!
//! A single-process publish/subscribe broker over WebSocket: connections join
//! rooms and register private user channels, messages are persisted before
//! they are fanned out, and every send is answered with an ack or an error.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use ui::run as run_server;
