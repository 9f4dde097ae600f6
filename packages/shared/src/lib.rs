//! Shared utilities for the Hiroba server and client.

pub mod logger;
pub mod time;
