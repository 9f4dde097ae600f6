//! InMemory Message Repository 実装
//!
//! ドメイン層が定義する MessageRepository trait の具体的な実装。
//! Vec を追記専用ログとして使用します。
//!
//! 送信者の表示名は追記時に UserRepository から解決して保持します
//! （リレーショナルストアでのユーザー結合に相当）。

use std::sync::Arc;

use async_trait::async_trait;
use hiroba_shared::time::get_jst_timestamp;
use tokio::sync::Mutex;

use crate::domain::{
    Message, MessageIdFactory, MessageRepository, NewMessage, RepositoryError, RoomKey, Timestamp,
    UserId, UserRepository,
};

/// 時刻ソース（テストで差し替え可能）
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// 追記専用ログ
#[derive(Default)]
struct MessageLog {
    /// 追記順 = created_at 昇順
    messages: Vec<Message>,
    /// 最後に割り当てた created_at
    last_created_at: i64,
}

/// インメモリ Message Repository 実装
pub struct InMemoryMessageRepository {
    /// 送信者の存在確認と表示名解決に使う
    users: Arc<dyn UserRepository>,
    log: Mutex<MessageLog>,
    clock: Clock,
}

impl InMemoryMessageRepository {
    /// 新しい InMemoryMessageRepository を作成
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self::with_clock(users, Box::new(get_jst_timestamp))
    }

    /// 時刻ソースを指定して作成
    pub fn with_clock(users: Arc<dyn UserRepository>, clock: Clock) -> Self {
        Self {
            users,
            log: Mutex::new(MessageLog::default()),
            clock,
        }
    }

    /// 保存済みメッセージ数
    pub async fn count(&self) -> usize {
        self.log.lock().await.messages.len()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        // 1. 送信者の存在確認（外部キー制約に相当）
        let sender = self
            .users
            .find_by_id(&message.sender_id)
            .await
            .ok_or_else(|| RepositoryError::UnknownSender(message.sender_id.to_string()))?;

        // 2. ID と時刻を割り当てて追記
        // 時計が戻っても created_at は減少しない
        let mut log = self.log.lock().await;
        let created_at = (self.clock)().max(log.last_created_at);
        log.last_created_at = created_at;

        let persisted = Message {
            id: MessageIdFactory::generate(),
            sender_id: message.sender_id,
            content: message.content,
            destination: message.destination,
            created_at: Timestamp::new(created_at),
            sender_name: sender.name,
        };
        log.messages.push(persisted.clone());

        Ok(persisted)
    }

    async fn find_by_room(&self, room: &RoomKey) -> Result<Vec<Message>, RepositoryError> {
        let log = self.log.lock().await;
        Ok(log
            .messages
            .iter()
            .filter(|m| m.destination.room() == Some(room))
            .cloned()
            .collect())
    }

    async fn find_by_participant(&self, user_id: &UserId) -> Result<Vec<Message>, RepositoryError> {
        let log = self.log.lock().await;
        Ok(log
            .messages
            .iter()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect())
    }
}
