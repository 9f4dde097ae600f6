//! Hiroba terminal chat client.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --token alice-token --room side-talk --notify
//! ```

use clap::Parser;
use hiroba_client::config::{ClientArgs, ClientConfig};
use hiroba_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = hiroba_client::run_client(ClientConfig::from(args)).await {
        eprintln!("hiroba-client: {e}");
        std::process::exit(1);
    }
}
