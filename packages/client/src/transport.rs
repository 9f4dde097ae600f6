//! WebSocket transport with reconnection.
//!
//! A background task owns the socket. Outgoing frames are read from an
//! unbounded channel only while a connection is up, so anything emitted while
//! offline stays queued and is flushed after the next connect.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use hiroba_server::infrastructure::dto::websocket::{ClientEvent, ServerEvent};

use crate::error::ClientError;

/// Events surfaced to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Server(ServerEvent),
    Disconnected { reason: String },
}

/// Exponential backoff between connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based), capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Derive the broker endpoint from the HTTP base url.
pub fn websocket_url(base_url: &str, token: Option<&str>) -> Result<String, ClientError> {
    let mut url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::InvalidUrl(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url.to_string())
}

/// Start the transport task.
///
/// Returns the sender for outgoing frames and the receiver of transport
/// events. The task ends once either side is dropped.
pub fn spawn(
    url: String,
    policy: ReconnectPolicy,
) -> (UnboundedSender<ClientEvent>, UnboundedReceiver<TransportEvent>) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(url, policy, outgoing_rx, events_tx));
    (outgoing_tx, events_rx)
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outgoing: UnboundedReceiver<ClientEvent>,
    events: UnboundedSender<TransportEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            tracing::info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::time::sleep(delay).await;
        }

        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                tracing::info!("Connected to broker");
                attempt = 0;
                stream
            }
            Err(e) => {
                tracing::warn!("Connection failed: {}", e);
                attempt = attempt.saturating_add(1);
                continue;
            }
        };
        let (mut sink, mut source) = stream.split();

        let reason = loop {
            tokio::select! {
                frame = outgoing.recv() => {
                    let Some(event) = frame else {
                        let _ = sink.close().await;
                        return;
                    };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("Sending frame: {}", text);
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break e.to_string();
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received frame: {}", text);
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => {
                                if events.send(TransportEvent::Server(event)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => tracing::warn!("Ignoring malformed frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break "closed by server".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                },
            }
        };

        tracing::warn!("Disconnected: {}", reason);
        if events.send(TransportEvent::Disconnected { reason }).is_err() {
            return;
        }
        attempt = 1;
    }
}
