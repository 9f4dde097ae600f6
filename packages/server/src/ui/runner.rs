//! Router construction and server entry point.

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig, error::ServerError, infrastructure::repository::InMemoryUserDirectory,
};

use super::{
    handler::{get_me, get_messages, get_rooms, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router around a prepared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/api/me", get(get_me))
        .route("/api/messages", get(get_messages))
        .route("/api/rooms", get(get_rooms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on an already bound listener until the shutdown signal.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Load users, bind and run the server.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let directory = match &config.users {
        Some(path) => InMemoryUserDirectory::load(path)?,
        None => {
            tracing::warn!("No user seed file given; every connection will be anonymous");
            InMemoryUserDirectory::default()
        }
    };
    let state = Arc::new(AppState::in_memory(directory, config.membership));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        "Listening on {} (membership policy: {})",
        listener.local_addr()?,
        config.membership
    );

    serve(listener, state).await
}
