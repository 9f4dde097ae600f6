//! Client session controller.
//!
//! Holds the state of one chat session: the loaded identity, the selected
//! conversation and its rendered timeline, unread counters for every other
//! conversation, and the sends still waiting for an acknowledgement.
//!
//! The controller does no I/O itself. History comes through [`HistorySource`],
//! outgoing frames go through [`BrokerLink`] and notifications through
//! [`Notifier`], so the same state machine drives the terminal client and the
//! tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use hiroba_server::{
    domain::{MessageContent, RoomKey, UserId, ValueObjectError},
    infrastructure::dto::websocket::{
        ClientEvent, ErrorCode, MessageDto, SendMessagePayload, ServerEvent, UserDto,
    },
};

use crate::error::ClientError;

/// Display name used when a message carries no sender name
pub const UNKNOWN_SENDER: &str = "Someone";

/// Ids of incoming messages remembered outside the active timeline
pub const RECENT_IDS_CAPACITY: usize = 512;

/// History query interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages of a room, ascending by creation time
    async fn room_history(&self, room: &str) -> Result<Vec<MessageDto>, ClientError>;

    /// Messages sent by or addressed to a user, ascending by creation time
    async fn participant_history(&self, user_id: &str) -> Result<Vec<MessageDto>, ClientError>;
}

/// Outgoing half of the broker connection
pub trait BrokerLink: Send + Sync {
    fn emit(&self, event: ClientEvent);
}

impl BrokerLink for UnboundedSender<ClientEvent> {
    fn emit(&self, event: ClientEvent) {
        if self.send(event).is_err() {
            tracing::warn!("Broker link is closed; dropping outgoing frame");
        }
    }
}

/// Notification side effect
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// A conversation the user can look at
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Conversation {
    Room(String),
    /// Keyed by the peer's user id
    Direct(String),
}

impl Conversation {
    /// Conversation a message belongs to, seen from `self_id`.
    pub fn of(message: &MessageDto, self_id: Option<&str>) -> Option<Self> {
        if let Some(room) = &message.room {
            return Some(Self::Room(room.clone()));
        }
        let receiver = message.receiver_id.as_ref()?;
        let peer = if Some(message.sender_id.as_str()) == self_id {
            receiver
        } else {
            &message.sender_id
        };
        Some(Self::Direct(peer.clone()))
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(room) => write!(f, "#{room}"),
            Self::Direct(peer) => write!(f, "@{peer}"),
        }
    }
}

/// What became of an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Appended to the active timeline
    Rendered,
    /// Counted against another conversation
    Unread { conversation: Conversation, count: usize },
    /// Already seen in this session
    Duplicate,
    /// Neither a room nor a direct message
    Dropped,
}

/// Result of feeding one server event to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Connected,
    Joined { room: String, left: Vec<String> },
    Registered { user_id: String },
    Message { message: MessageDto, outcome: Incoming },
    Acked { request_id: Option<String> },
    Failed {
        request_id: Option<String>,
        code: ErrorCode,
        reason: String,
    },
}

/// Bounded window of the most recently received message ids
#[derive(Debug, Default)]
struct RecentIds {
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl RecentIds {
    fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.index.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > RECENT_IDS_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct ChatSession {
    history: Arc<dyn HistorySource>,
    broker: Box<dyn BrokerLink>,
    notifier: Box<dyn Notifier>,
    notifications_granted: bool,
    identity: Option<UserDto>,
    conversation: Option<Conversation>,
    timeline: Vec<MessageDto>,
    unread: BTreeMap<Conversation, usize>,
    /// Ids on the active timeline
    timeline_ids: HashSet<String>,
    recent: RecentIds,
    /// request id -> time the send was emitted
    pending: HashMap<String, Instant>,
    online: bool,
}

impl ChatSession {
    pub fn new(
        history: Arc<dyn HistorySource>,
        broker: Box<dyn BrokerLink>,
        notifier: Box<dyn Notifier>,
        notifications_granted: bool,
    ) -> Self {
        Self {
            history,
            broker,
            notifier,
            notifications_granted,
            identity: None,
            conversation: None,
            timeline: Vec::new(),
            unread: BTreeMap::new(),
            timeline_ids: HashSet::new(),
            recent: RecentIds::default(),
            pending: HashMap::new(),
            online: false,
        }
    }

    pub fn set_identity(&mut self, identity: Option<UserDto>) {
        self.identity = identity;
    }

    pub fn identity(&self) -> Option<&UserDto> {
        self.identity.as_ref()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn timeline(&self) -> &[MessageDto] {
        &self.timeline
    }

    pub fn unread(&self) -> &BTreeMap<Conversation, usize> {
        &self.unread
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Number of message ids kept for duplicate detection
    pub fn tracked_ids(&self) -> usize {
        self.timeline_ids.len() + self.recent.len()
    }

    fn self_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|user| user.id.as_str())
    }

    /// Enter a room: load its history, join it and clear its unread count.
    pub async fn select_room(&mut self, room: &str) -> Result<&[MessageDto], ClientError> {
        let room = RoomKey::new(room.to_string())?.into_string();
        let history = self.room_history(&room).await;

        self.broker.emit(ClientEvent::JoinRoom { room: room.clone() });
        self.enter(Conversation::Room(room), history);
        Ok(&self.timeline)
    }

    /// Enter a direct conversation with `peer`.
    ///
    /// Direct messages arrive on the private channel, so nothing is joined.
    pub async fn select_direct(&mut self, peer: &str) -> Result<&[MessageDto], ClientError> {
        let peer = UserId::new(peer.to_string())?.into_string();
        let conversation = Conversation::Direct(peer);
        let history = self.direct_history(&conversation).await?;

        self.enter(conversation, history);
        Ok(&self.timeline)
    }

    /// Reload the active conversation after a reconnect.
    ///
    /// Messages broadcast while offline are only reachable through history.
    /// Membership is restored by [`Self::on_connected`], so nothing is emitted.
    pub async fn resync(&mut self) -> Result<Option<&[MessageDto]>, ClientError> {
        let Some(conversation) = self.conversation.clone() else {
            return Ok(None);
        };
        let history = match &conversation {
            Conversation::Room(room) => self.room_history(room).await,
            Conversation::Direct(_) => self.direct_history(&conversation).await?,
        };
        self.enter(conversation, history);
        Ok(Some(&self.timeline))
    }

    async fn room_history(&self, room: &str) -> Vec<MessageDto> {
        match self.history.room_history(room).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to load history of room '{}': {}", room, e);
                Vec::new()
            }
        }
    }

    async fn direct_history(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<MessageDto>, ClientError> {
        let self_id = self.self_id().ok_or(ClientError::NoIdentity)?;
        Ok(match self.history.participant_history(self_id).await {
            Ok(messages) => messages
                .into_iter()
                .filter(|m| Conversation::of(m, Some(self_id)).as_ref() == Some(conversation))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to load history of '{}': {}", conversation, e);
                Vec::new()
            }
        })
    }

    fn enter(&mut self, conversation: Conversation, history: Vec<MessageDto>) {
        self.timeline_ids = history.iter().map(|m| m.id.clone()).collect();
        self.unread.remove(&conversation);
        self.timeline = history;
        self.conversation = Some(conversation);
    }

    /// Route a broadcast message to the timeline or an unread counter.
    pub fn on_incoming_message(&mut self, message: MessageDto) -> Incoming {
        if self.timeline_ids.contains(&message.id) || self.recent.contains(&message.id) {
            return Incoming::Duplicate;
        }
        self.recent.insert(message.id.clone());

        let Some(conversation) = Conversation::of(&message, self.self_id()) else {
            tracing::warn!("Dropping message '{}' without destination", message.id);
            return Incoming::Dropped;
        };

        if self.notifications_granted && Some(message.sender_id.as_str()) != self.self_id() {
            let title = if message.sender.name.trim().is_empty() {
                UNKNOWN_SENDER
            } else {
                message.sender.name.as_str()
            };
            self.notifier.notify(title, &message.content);
        }

        if self.conversation.as_ref() == Some(&conversation) {
            self.timeline_ids.insert(message.id.clone());
            self.timeline.push(message);
            Incoming::Rendered
        } else {
            let count = self.unread.entry(conversation.clone()).or_insert(0);
            *count += 1;
            Incoming::Unread {
                conversation,
                count: *count,
            }
        }
    }

    /// Send `text` to the selected conversation.
    ///
    /// Nothing is rendered here; the message appears when the broker echoes it.
    /// Returns the request id the acknowledgement will carry.
    pub fn send_message(&mut self, text: &str) -> Result<String, ClientError> {
        // The broker accepts whitespace; the input box does not
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let content = MessageContent::new(text.to_string()).map_err(|e| match e {
            ValueObjectError::MessageContentEmpty => ClientError::EmptyMessage,
            other => ClientError::Validation(other),
        })?;
        let sender_id = self.self_id().ok_or(ClientError::NoIdentity)?.to_string();
        let (room, receiver_id) = match &self.conversation {
            Some(Conversation::Room(room)) => (Some(room.clone()), None),
            Some(Conversation::Direct(peer)) => (None, Some(peer.clone())),
            None => return Err(ClientError::NoConversation),
        };

        let request_id = Uuid::new_v4().to_string();
        self.broker.emit(ClientEvent::SendMessage(SendMessagePayload {
            request_id: Some(request_id.clone()),
            content: content.into_string(),
            sender_id: Some(sender_id),
            room,
            receiver_id,
        }));
        self.pending.insert(request_id.clone(), Instant::now());
        Ok(request_id)
    }

    /// Resolve a pending send. Returns false for unknown request ids.
    pub fn on_ack(&mut self, request_id: Option<&str>) -> bool {
        request_id.is_some_and(|id| self.pending.remove(id).is_some())
    }

    /// Resolve a pending send that the broker refused.
    pub fn on_broker_error(&mut self, request_id: Option<&str>) -> bool {
        self.on_ack(request_id)
    }

    /// Drop and return sends older than `timeout`.
    pub fn expire_pending(&mut self, timeout: Duration) -> Vec<String> {
        self.expire_pending_at(Instant::now(), timeout)
    }

    fn expire_pending_at(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, sent_at)| now.saturating_duration_since(**sent_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    /// Restore broker-side membership after a (re)connect.
    ///
    /// History missed while offline is reloaded by [`Self::resync`].
    pub fn on_connected(&mut self, user: Option<UserDto>) {
        self.online = true;
        if user.is_some() {
            self.identity = user;
        }

        if let Some(user_id) = self.self_id().map(str::to_string) {
            self.broker.emit(ClientEvent::RegisterUser { user_id });
        }
        if let Some(Conversation::Room(room)) = &self.conversation {
            self.broker.emit(ClientEvent::JoinRoom { room: room.clone() });
        }
    }

    pub fn on_disconnected(&mut self) {
        self.online = false;
    }

    /// Feed one server event to the session.
    pub fn handle_event(&mut self, event: ServerEvent) -> SessionUpdate {
        match event {
            ServerEvent::Connected { user, .. } => {
                self.on_connected(user);
                SessionUpdate::Connected
            }
            ServerEvent::RoomJoined { room, left } => SessionUpdate::Joined { room, left },
            ServerEvent::UserRegistered { user_id } => SessionUpdate::Registered { user_id },
            ServerEvent::NewMessage { message } => {
                let outcome = self.on_incoming_message(message.clone());
                SessionUpdate::Message { message, outcome }
            }
            ServerEvent::Ack { request_id, .. } => {
                self.on_ack(request_id.as_deref());
                SessionUpdate::Acked { request_id }
            }
            ServerEvent::Error {
                request_id,
                code,
                reason,
            } => {
                self.on_broker_error(request_id.as_deref());
                SessionUpdate::Failed {
                    request_id,
                    code,
                    reason,
                }
            }
        }
    }
}
