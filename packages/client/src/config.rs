//! Client configuration.

use std::time::Duration;

use clap::Parser;

/// Command line arguments of the client binary
#[derive(Debug, Clone, Parser)]
#[command(name = "hiroba-client", version, about = "Hiroba terminal chat client")]
pub struct ClientArgs {
    /// Base URL of the server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Session token; without it the client can only read rooms
    #[arg(long)]
    pub token: Option<String>,

    /// Room to open on start
    #[arg(long, default_value = "side-talk")]
    pub room: String,

    /// Allow notifications for messages from others
    #[arg(long)]
    pub notify: bool,

    /// Seconds to wait for an acknowledgement before reporting a send as failed
    #[arg(long, default_value_t = 10)]
    pub ack_timeout: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub token: Option<String>,
    pub room: String,
    pub notify: bool,
    pub ack_timeout: Duration,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            url: args.url,
            token: args.token.filter(|token| !token.trim().is_empty()),
            room: args.room,
            notify: args.notify,
            ack_timeout: Duration::from_secs(args.ack_timeout),
        }
    }
}
