//! UseCase: メッセージ送信処理
//!
//! ## 処理の流れ
//!
//! 1. 入力検証（内容・送信者・宛先）。失敗時は永続化しない
//! 2. 送信者が接続の本人であることを確認
//! 3. MessageRepository へ 1 回だけ追記
//! 4. 追記成功後にのみ配信（ConnectionRegistry::fan_out）
//!    - ルーム宛て: そのルームに参加中の全接続（送信者自身も含む）
//!    - ダイレクト: 送信者と受信者のユーザーチャンネル（同一人物でも 2 回）
//!
//! 3 と 4 は [`PublishOrder`] を保持したまま行います。ブローカー全体で 1 つの
//! PublishOrder を共有するので、どの受信者にも永続化順に new-message が届きます。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    ConnectionId, ConnectionRegistry, Destination, Message, MessageContent, MessageRepository,
    NewMessage, UserId,
};

use super::error::SendMessageError;

/// send-message の入力（ワイヤ形式そのまま）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub content: String,
    pub sender_id: Option<String>,
    pub room: Option<String>,
    pub receiver_id: Option<String>,
}

/// 送信結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// 永続化済みメッセージ
    pub message: Message,
    /// 配信先（チャンネル単位の重複を含む）
    pub targets: Vec<ConnectionId>,
    /// outbox に投入できた数
    pub delivered: usize,
}

/// 追記から配信までを直列化するロック
///
/// クローンは同じロックを共有する。
#[derive(Clone, Default)]
pub struct PublishOrder(Arc<Mutex<()>>);

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    messages: Arc<dyn MessageRepository>,
    registry: Arc<dyn ConnectionRegistry>,
    order: PublishOrder,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        registry: Arc<dyn ConnectionRegistry>,
        order: PublishOrder,
    ) -> Self {
        Self {
            messages,
            registry,
            order,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `connection_id` - 送信元の接続
    /// * `command` - 送信内容
    ///
    /// # Returns
    ///
    /// * `Ok(SendOutcome)` - 永続化済みメッセージと配信先
    /// * `Err(SendMessageError)` - 送信失敗（何も配信してはならない）
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        command: SendMessageCommand,
    ) -> Result<SendOutcome, SendMessageError> {
        // 1. 入力検証
        let content = MessageContent::new(command.content)?;
        let sender_id = UserId::new(command.sender_id.ok_or(SendMessageError::MissingSender)?)?;
        let destination = Destination::from_parts(command.room, command.receiver_id)?;

        // 2. 本人確認
        let connection = self
            .registry
            .get_connection(connection_id)
            .await
            .ok_or_else(|| SendMessageError::ConnectionNotFound(connection_id.to_string()))?;
        match connection.identity {
            None => return Err(SendMessageError::Unauthenticated),
            Some(identity) if identity != sender_id => {
                return Err(SendMessageError::SenderMismatch {
                    identity: identity.into_string(),
                    sender: sender_id.into_string(),
                });
            }
            Some(_) => {}
        }

        let _order = self.order.0.lock().await;

        // 3. 永続化
        let message = self
            .messages
            .append(NewMessage::new(sender_id, content, destination))
            .await?;

        // 4. 配信
        let fan_out = self.registry.fan_out(&message).await;

        Ok(SendOutcome {
            message,
            targets: fan_out.targets,
            delivered: fan_out.delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ConnectionIdFactory, MockMessageRepository, RepositoryError, RoomKey, Timestamp, User,
            ValueObjectError,
        },
        infrastructure::{
            dto::websocket::ServerEvent,
            repository::{
                InMemoryConnectionRegistry, InMemoryMessageRepository, InMemoryUserDirectory,
            },
        },
    };
    use tokio::sync::mpsc;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ルーム宛て: 1 件永続化され、参加中の全接続（送信者含む）が配信対象
    // - ダイレクト: 送信者と受信者のチャンネルが配信対象（同一人物なら 2 回）
    // - 検証・認可・永続化の失敗時に配信対象が返らないこと
    // - 並行送信でも受信順が永続化順と一致すること
    // ========================================

    struct Fixture {
        registry: Arc<InMemoryConnectionRegistry>,
        store: Arc<InMemoryMessageRepository>,
        usecase: SendMessageUseCase,
        // Receiver を保持して outbox を閉じないようにする
        _receivers: Vec<mpsc::UnboundedReceiver<String>>,
    }

    impl Fixture {
        fn new() -> Self {
            let users = InMemoryUserDirectory::new(vec![
                (user("u1", "Alice"), None),
                (user("u2", "Bob"), None),
                (user("u3", "Carol"), None),
            ]);
            let registry = Arc::new(InMemoryConnectionRegistry::default());
            let store = Arc::new(InMemoryMessageRepository::new(Arc::new(users)));
            let usecase =
                SendMessageUseCase::new(store.clone(), registry.clone(), PublishOrder::default());
            Self {
                registry,
                store,
                usecase,
                _receivers: Vec::new(),
            }
        }

        /// 接続を作り、ユーザーチャンネルとルームに参加させる
        async fn connect(&mut self, identity: &str, rooms: &[&str]) -> ConnectionId {
            let (tx, rx) = mpsc::unbounded_channel();
            self._receivers.push(rx);
            let id = ConnectionIdFactory::generate();
            let user_id = UserId::new(identity.to_string()).unwrap();
            self.registry
                .add_connection(id.clone(), Some(user_id.clone()), tx, Timestamp::new(0))
                .await
                .unwrap();
            self.registry.subscribe_user(&id, user_id).await.unwrap();
            for room in rooms {
                self.registry
                    .join_room(&id, RoomKey::new(room.to_string()).unwrap())
                    .await
                    .unwrap();
            }
            id
        }
    }

    fn user(id: &str, name: &str) -> User {
        User::new(UserId::new(id.to_string()).unwrap(), name, format!("{id}@example.com"))
    }

    fn room_command(sender: &str, room: &str, content: &str) -> SendMessageCommand {
        SendMessageCommand {
            content: content.to_string(),
            sender_id: Some(sender.to_string()),
            room: Some(room.to_string()),
            receiver_id: None,
        }
    }

    fn direct_command(sender: &str, receiver: &str, content: &str) -> SendMessageCommand {
        SendMessageCommand {
            content: content.to_string(),
            sender_id: Some(sender.to_string()),
            room: None,
            receiver_id: Some(receiver.to_string()),
        }
    }

    #[tokio::test]
    async fn test_room_message_targets_every_room_member_including_sender() {
        // テスト項目: ルーム宛ては参加中の全接続（送信者含む）に配信される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;
        let bob = fx.connect("u2", &["side-talk"]).await;
        let _carol = fx.connect("u3", &["team-silicon"]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, room_command("u1", "side-talk", "hi"))
            .await
            .unwrap();

        // then (期待する結果):
        let mut expected = vec![alice, bob];
        expected.sort();
        assert_eq!(outcome.targets, expected);
        assert_eq!(outcome.message.sender_name, "Alice");
        assert_eq!(fx.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_room_message_scenario_is_persisted_with_room_destination() {
        // テスト項目: {content:"hi", senderId:"u1", room:"side-talk"} は
        //             ルーム宛てとして 1 件だけ永続化される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;

        // when (操作):
        fx.usecase
            .execute(&alice, room_command("u1", "side-talk", "hi"))
            .await
            .unwrap();

        // then (期待する結果):
        let room = RoomKey::new("side-talk".to_string()).unwrap();
        let stored = fx.store.find_by_room(&room).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.as_str(), "hi");
        assert_eq!(stored[0].sender_id.as_str(), "u1");
        assert_eq!(stored[0].destination, Destination::Room(room));
    }

    #[tokio::test]
    async fn test_sender_outside_room_is_not_echoed() {
        // テスト項目: 送信者がルームに参加していなければ送信者には配信されない
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &[]).await;
        let bob = fx.connect("u2", &["side-talk"]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, room_command("u1", "side-talk", "hi"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.targets, vec![bob]);
    }

    #[tokio::test]
    async fn test_direct_message_targets_both_private_channels() {
        // テスト項目: ダイレクトは送信者と受信者のチャンネルに配信される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;
        let bob = fx.connect("u2", &["side-talk"]).await;
        let _carol = fx.connect("u3", &["side-talk"]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, direct_command("u1", "u2", "psst"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.targets, vec![alice, bob]);
        assert_eq!(
            outcome.message.destination,
            Destination::Direct(UserId::new("u2".to_string()).unwrap())
        );
    }

    #[tokio::test]
    async fn test_direct_message_to_self_emits_twice() {
        // テスト項目: 自分宛てのダイレクトでもチャンネル配信は 2 回
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &[]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, direct_command("u1", "u1", "note to self"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.targets, vec![alice.clone(), alice]);
    }

    #[tokio::test]
    async fn test_direct_message_to_offline_receiver_still_persists() {
        // テスト項目: 受信者がオフラインでも永続化され、送信者にだけ配信される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &[]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, direct_command("u1", "u3", "later"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.targets, vec![alice]);
        assert_eq!(fx.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_n_sends_are_returned_in_order() {
        // テスト項目: N 回送信するとルーム検索で N 件が created_at 昇順で返る
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;
        let n = 20;

        // when (操作):
        for i in 0..n {
            fx.usecase
                .execute(&alice, room_command("u1", "side-talk", &format!("m{i}")))
                .await
                .unwrap();
        }

        // then (期待する結果):
        let room = RoomKey::new("side-talk".to_string()).unwrap();
        let stored = fx.store.find_by_room(&room).await.unwrap();
        assert_eq!(stored.len(), n);
        assert!(stored.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_room_sends_arrive_in_persisted_order() {
        // テスト項目: 複数接続から同じルームへ並行送信しても、
        //             受信者に届く順序はルーム検索の順序（永続化順）と一致する
        // given (前提条件):
        let mut fx = Fixture::new();
        let room = RoomKey::new("side-talk".to_string()).unwrap();
        let (tx, mut listener_rx) = mpsc::unbounded_channel();
        let listener = ConnectionIdFactory::generate();
        fx.registry
            .add_connection(
                listener.clone(),
                Some(UserId::new("u2".to_string()).unwrap()),
                tx,
                Timestamp::new(0),
            )
            .await
            .unwrap();
        fx.registry.join_room(&listener, room.clone()).await.unwrap();
        let mut senders = Vec::new();
        for _ in 0..8 {
            senders.push(fx.connect("u1", &[]).await);
        }
        let usecase = Arc::new(fx.usecase);

        // when (操作):
        let tasks: Vec<_> = senders
            .into_iter()
            .enumerate()
            .map(|(n, sender)| {
                let usecase = usecase.clone();
                tokio::spawn(async move {
                    for i in 0..200 {
                        usecase
                            .execute(&sender, room_command("u1", "side-talk", &format!("{n}-{i}")))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // then (期待する結果):
        let mut arrived = Vec::new();
        while let Ok(frame) = listener_rx.try_recv() {
            match serde_json::from_str::<ServerEvent>(&frame).unwrap() {
                ServerEvent::NewMessage { message } => arrived.push(message.id),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        let persisted: Vec<String> = fx
            .store
            .find_by_room(&room)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(arrived.len(), 1600);
        assert_eq!(arrived, persisted);
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected_before_persistence() {
        // テスト項目: 空の内容は永続化前に拒否される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;

        // when (操作):
        let result = fx
            .usecase
            .execute(&alice, room_command("u1", "side-talk", ""))
            .await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            SendMessageError::Validation(ValueObjectError::MessageContentEmpty)
        );
        assert_eq!(fx.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_whitespace_content_is_persisted_and_broadcast() {
        // テスト項目: 空白のみの内容も空ではないので永続化・配信される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;

        // when (操作):
        let outcome = fx
            .usecase
            .execute(&alice, room_command("u1", "side-talk", "   "))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.message.content.as_str(), "   ");
        assert_eq!(outcome.targets, vec![alice]);
        assert_eq!(fx.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_sender_is_rejected() {
        // テスト項目: senderId がなければ拒否される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;
        let mut command = room_command("u1", "side-talk", "hi");
        command.sender_id = None;

        // when (操作):
        let result = fx.usecase.execute(&alice, command).await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), SendMessageError::MissingSender);
        assert_eq!(fx.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_room_and_receiver_together_are_rejected() {
        // テスト項目: room と receiverId を同時に指定すると拒否される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;
        let mut command = room_command("u1", "side-talk", "hi");
        command.receiver_id = Some("u2".to_string());

        // when (操作):
        let result = fx.usecase.execute(&alice, command).await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            SendMessageError::Validation(ValueObjectError::DestinationAmbiguous)
        );
    }

    #[tokio::test]
    async fn test_spoofed_sender_is_rejected() {
        // テスト項目: 他人になりすました送信は拒否される
        // given (前提条件):
        let mut fx = Fixture::new();
        let alice = fx.connect("u1", &["side-talk"]).await;

        // when (操作):
        let result = fx
            .usecase
            .execute(&alice, room_command("u2", "side-talk", "hi"))
            .await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            SendMessageError::SenderMismatch {
                identity: "u1".to_string(),
                sender: "u2".to_string()
            }
        );
        assert_eq!(fx.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_anonymous_connection_cannot_send() {
        // テスト項目: 匿名接続からは送信できない
        // given (前提条件):
        let fx = Fixture::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let anonymous = ConnectionIdFactory::generate();
        fx.registry
            .add_connection(anonymous.clone(), None, tx, Timestamp::new(0))
            .await
            .unwrap();

        // when (操作):
        let result = fx
            .usecase
            .execute(&anonymous, room_command("u1", "side-talk", "hi"))
            .await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), SendMessageError::Unauthenticated);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_broadcast() {
        // テスト項目: 永続化に失敗したら配信対象を返さずエラーになる
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let alice = ConnectionIdFactory::generate();
        let alice_id = UserId::new("u1".to_string()).unwrap();
        registry
            .add_connection(alice.clone(), Some(alice_id.clone()), tx, Timestamp::new(0))
            .await
            .unwrap();
        registry
            .join_room(&alice, RoomKey::new("side-talk".to_string()).unwrap())
            .await
            .unwrap();

        let mut store = MockMessageRepository::new();
        store
            .expect_append()
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("disk full".to_string())));
        let usecase = SendMessageUseCase::new(Arc::new(store), registry, PublishOrder::default());

        // when (操作):
        let result = usecase
            .execute(&alice, room_command("u1", "side-talk", "hi"))
            .await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            SendMessageError::Storage(RepositoryError::Unavailable("disk full".to_string()))
        );
    }

    #[tokio::test]
    async fn test_validation_failure_never_touches_storage() {
        // テスト項目: 検証エラー時はストアが呼ばれない
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let mut store = MockMessageRepository::new();
        store.expect_append().never();
        let usecase = SendMessageUseCase::new(Arc::new(store), registry, PublishOrder::default());
        let connection = ConnectionIdFactory::generate();

        // when (操作):
        let result = usecase
            .execute(&connection, room_command("u1", "side-talk", ""))
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(SendMessageError::Validation(_))));
    }
}
