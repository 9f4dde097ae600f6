//! InMemory Connection Registry 実装
//!
//! ブローカーのメンバーシップ表（接続・ルーム・ユーザーチャンネル）を
//! 1 つの Mutex で保護し、各操作をアトミックに行います。
//! fan_out は配信先の解決と outbox への投入を同じロック区間で行います。
//!
//! ```text
//! connections: ConnectionId -> ConnectionEntry (outbox, state, rooms)
//! rooms:       RoomKey      -> {ConnectionId}
//! users:       UserId       -> {ConnectionId}
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{
        ConnectionId, ConnectionRegistry, ConnectionSnapshot, ConnectionState, Destination, FanOut,
        JoinOutcome, MembershipPolicy, Message, Outbox, RegistryError, RoomKey, Timestamp, UserId,
    },
    infrastructure::dto::websocket::{MessageDto, ServerEvent},
};

/// 接続ごとの状態
struct ConnectionEntry {
    outbox: Outbox,
    identity: Option<UserId>,
    state: ConnectionState,
    rooms: BTreeSet<RoomKey>,
    /// 購読中のユーザーチャンネル
    channels: BTreeSet<UserId>,
    connected_at: Timestamp,
}

impl ConnectionEntry {
    fn snapshot(&self, id: &ConnectionId) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: id.clone(),
            identity: self.identity.clone(),
            state: self.state,
            rooms: self.rooms.clone(),
            connected_at: self.connected_at,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
}

impl RegistryState {
    /// 逆引き表から接続を外し、空になったキーは削除する
    fn leave_room(&mut self, room: &RoomKey, connection_id: &ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn leave_channel(&mut self, user_id: &UserId, connection_id: &ConnectionId) {
        if let Some(members) = self.users.get_mut(user_id) {
            members.remove(connection_id);
            if members.is_empty() {
                self.users.remove(user_id);
            }
        }
    }

    /// 配信先（チャンネル単位の重複を含む）
    fn recipients(&self, message: &Message) -> Vec<ConnectionId> {
        match &message.destination {
            Destination::Room(room) => sorted(self.rooms.get(room)),
            Destination::Direct(receiver) => {
                let mut targets = sorted(self.users.get(&message.sender_id));
                targets.extend(sorted(self.users.get(receiver)));
                targets
            }
        }
    }
}

/// インメモリ接続レジストリ
pub struct InMemoryConnectionRegistry {
    policy: MembershipPolicy,
    state: Mutex<RegistryState>,
}

impl InMemoryConnectionRegistry {
    /// 新しい InMemoryConnectionRegistry を作成
    pub fn new(policy: MembershipPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn policy(&self) -> MembershipPolicy {
        self.policy
    }
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new(MembershipPolicy::default())
    }
}

fn sorted(ids: Option<&HashSet<ConnectionId>>) -> Vec<ConnectionId> {
    let mut ids: Vec<_> = ids.into_iter().flatten().cloned().collect();
    ids.sort();
    ids
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn add_connection(
        &self,
        connection_id: ConnectionId,
        identity: Option<UserId>,
        outbox: Outbox,
        connected_at: Timestamp,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        if state.connections.contains_key(&connection_id) {
            return Err(RegistryError::DuplicateConnection(connection_id.to_string()));
        }
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                outbox,
                identity,
                state: ConnectionState::Connected,
                rooms: BTreeSet::new(),
                channels: BTreeSet::new(),
                connected_at,
            },
        );
        Ok(())
    }

    async fn remove_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<ConnectionSnapshot, RegistryError> {
        let mut state = self.state.lock().await;
        let entry = state
            .connections
            .remove(connection_id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(connection_id.to_string()))?;

        for room in &entry.rooms {
            state.leave_room(room, connection_id);
        }
        for user_id in &entry.channels {
            state.leave_channel(user_id, connection_id);
        }

        let mut snapshot = entry.snapshot(connection_id);
        snapshot.state = ConnectionState::Disconnected;
        Ok(snapshot)
    }

    async fn get_connection(&self, connection_id: &ConnectionId) -> Option<ConnectionSnapshot> {
        let state = self.state.lock().await;
        state
            .connections
            .get(connection_id)
            .map(|entry| entry.snapshot(connection_id))
    }

    async fn join_room(
        &self,
        connection_id: &ConnectionId,
        room: RoomKey,
    ) -> Result<JoinOutcome, RegistryError> {
        let mut state = self.state.lock().await;
        let entry = state
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(connection_id.to_string()))?;

        let left: Vec<RoomKey> = match self.policy {
            MembershipPolicy::Cumulative => Vec::new(),
            MembershipPolicy::Exclusive => {
                let others: Vec<_> = entry.rooms.iter().filter(|r| **r != room).cloned().collect();
                for other in &others {
                    entry.rooms.remove(other);
                }
                others
            }
        };
        let newly_joined = entry.rooms.insert(room.clone());

        for other in &left {
            state.leave_room(other, connection_id);
        }
        state
            .rooms
            .entry(room)
            .or_default()
            .insert(connection_id.clone());

        Ok(JoinOutcome { newly_joined, left })
    }

    async fn subscribe_user(
        &self,
        connection_id: &ConnectionId,
        user_id: UserId,
    ) -> Result<bool, RegistryError> {
        let mut state = self.state.lock().await;
        let entry = state
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(connection_id.to_string()))?;

        entry.state = ConnectionState::Registered;
        let newly_subscribed = entry.channels.insert(user_id.clone());
        state
            .users
            .entry(user_id)
            .or_default()
            .insert(connection_id.clone());

        Ok(newly_subscribed)
    }

    async fn room_subscribers(&self, room: &RoomKey) -> Vec<ConnectionId> {
        let state = self.state.lock().await;
        sorted(state.rooms.get(room))
    }

    async fn user_subscribers(&self, user_id: &UserId) -> Vec<ConnectionId> {
        let state = self.state.lock().await;
        sorted(state.users.get(user_id))
    }

    async fn fan_out(&self, message: &Message) -> FanOut {
        let event = ServerEvent::NewMessage {
            message: MessageDto::from(message),
        };
        let state = self.state.lock().await;
        let targets = state.recipients(message);
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to serialize message '{}': {}", message.id, e);
                return FanOut {
                    targets,
                    delivered: 0,
                };
            }
        };

        let mut delivered = 0;
        for target in &targets {
            match state.connections.get(target) {
                Some(entry) if entry.outbox.send(frame.clone()).is_ok() => delivered += 1,
                Some(_) => {
                    tracing::warn!("Outbox of connection '{}' is closed", target);
                }
                None => {
                    tracing::debug!("Skipping delivery to departed connection '{}'", target);
                }
            }
        }
        FanOut { targets, delivered }
    }

    async fn active_rooms(&self) -> Vec<(RoomKey, usize)> {
        let state = self.state.lock().await;
        let mut rooms: Vec<_> = state
            .rooms
            .iter()
            .map(|(room, members)| (room.clone(), members.len()))
            .collect();
        rooms.sort();
        rooms
    }

    async fn count_connections(&self) -> usize {
        self.state.lock().await.connections.len()
    }
}
