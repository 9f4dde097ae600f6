//! Server configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::domain::MembershipPolicy;

/// Command line arguments of the server binary
#[derive(Debug, Clone, Parser)]
#[command(name = "hiroba-server", version, about = "Hiroba chat message broker")]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Room membership policy: `cumulative` keeps every joined room,
    /// `exclusive` leaves the previous room on join
    #[arg(long, default_value = "cumulative")]
    pub membership: MembershipPolicy,

    /// JSON file of users and session tokens
    #[arg(long)]
    pub users: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub membership: MembershipPolicy,
    pub users: Option<PathBuf>,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            membership: args.membership,
            users: args.users,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            membership: MembershipPolicy::default(),
            users: None,
        }
    }
}
