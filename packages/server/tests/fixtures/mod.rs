//! Test fixtures: an in-process server on an ephemeral port and a small
//! WebSocket client speaking the broker's frame protocol.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use hiroba_server::{
    domain::{MembershipPolicy, SessionToken, User, UserId},
    infrastructure::{
        dto::websocket::{ClientEvent, SendMessagePayload, ServerEvent},
        repository::InMemoryUserDirectory,
    },
    ui::{serve, state::AppState},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

/// How long to wait for a frame that is expected to arrive
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that no frame will arrive
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Users u1 (Alice), u2 (Bob) and u3 (Carol) with tokens `u{n}-token`.
pub fn directory() -> InMemoryUserDirectory {
    InMemoryUserDirectory::new(
        [("u1", "Alice"), ("u2", "Bob"), ("u3", "Carol")]
            .into_iter()
            .map(|(id, name)| {
                (
                    User::new(
                        UserId::new(id.to_string()).unwrap(),
                        name,
                        format!("{id}@example.com"),
                    ),
                    Some(SessionToken::new(format!("{id}-token")).unwrap()),
                )
            })
            .collect(),
    )
}

pub struct TestServer {
    addr: std::net::SocketAddr,
    pub state: Arc<AppState>,
}

impl TestServer {
    /// Start a server with users u1 (Alice), u2 (Bob) and u3 (Carol).
    pub async fn start() -> Self {
        Self::start_with_policy(MembershipPolicy::Cumulative).await
    }

    pub async fn start_with_policy(policy: MembershipPolicy) -> Self {
        Self::start_with_state(Arc::new(AppState::in_memory(directory(), policy))).await
    }

    /// Start a server around prepared state.
    pub async fn start_with_state(state: Arc<AppState>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_state = state.clone();
        tokio::spawn(async move {
            serve(listener, server_state).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws?token={}", self.addr, token),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    /// Connect and consume the `connected` greeting.
    pub async fn connect(&self, token: Option<&str>) -> TestClient {
        let (stream, _) = connect_async(self.ws_url(token)).await.unwrap();
        let mut client = TestClient { stream };
        match client.recv().await {
            ServerEvent::Connected { .. } => client,
            other => panic!("expected connected greeting, got {other:?}"),
        }
    }
}

pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn send(&mut self, event: &ClientEvent) {
        let frame = serde_json::to_string(event).unwrap();
        self.stream.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    /// Next server event; panics after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerEvent {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream closed")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Asserts that nothing arrives within [`QUIET_PERIOD`].
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(Ok(Message::Text(text)))) =
            tokio::time::timeout(QUIET_PERIOD, self.stream.next()).await
        {
            panic!("unexpected frame: {text}");
        }
    }

    /// Join a room and wait for the confirmation.
    pub async fn join(&mut self, room: &str) {
        self.send(&ClientEvent::JoinRoom {
            room: room.to_string(),
        })
        .await;
        match self.recv().await {
            ServerEvent::RoomJoined { room: joined, .. } if joined == room => {}
            other => panic!("expected room-joined, got {other:?}"),
        }
    }

    /// Register the private channel and wait for the confirmation.
    pub async fn register(&mut self, user_id: &str) {
        self.send(&ClientEvent::RegisterUser {
            user_id: user_id.to_string(),
        })
        .await;
        match self.recv().await {
            ServerEvent::UserRegistered { .. } => {}
            other => panic!("expected user-registered, got {other:?}"),
        }
    }

    pub async fn send_to_room(&mut self, request_id: &str, sender: &str, room: &str, content: &str) {
        self.send(&ClientEvent::SendMessage(SendMessagePayload {
            request_id: Some(request_id.to_string()),
            content: content.to_string(),
            sender_id: Some(sender.to_string()),
            room: Some(room.to_string()),
            receiver_id: None,
        }))
        .await;
    }

    pub async fn send_direct(
        &mut self,
        request_id: &str,
        sender: &str,
        receiver: &str,
        content: &str,
    ) {
        self.send(&ClientEvent::SendMessage(SendMessagePayload {
            request_id: Some(request_id.to_string()),
            content: content.to_string(),
            sender_id: Some(sender.to_string()),
            room: None,
            receiver_id: Some(receiver.to_string()),
        }))
        .await;
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
