//! UseCase: ユーザーチャンネル登録
//!
//! 接続を本人のプライベートチャンネルに購読させます（ダイレクトメッセージと
//! 送信者エコー用）。接続時に解決した本人以外のチャンネルは購読できません。

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionRegistry, UserId};

use super::error::SubscriptionError;

/// ユーザーチャンネル登録のユースケース
pub struct RegisterUserUseCase {
    registry: Arc<dyn ConnectionRegistry>,
}

impl RegisterUserUseCase {
    /// 新しい RegisterUserUseCase を作成
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// ユーザーチャンネル登録を実行
    ///
    /// # Returns
    ///
    /// * `Ok((user_id, true))` - 新規に購読した
    /// * `Ok((user_id, false))` - 既に購読済み
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        user_id: String,
    ) -> Result<(UserId, bool), SubscriptionError> {
        let user_id = UserId::new(user_id)?;

        let connection = self
            .registry
            .get_connection(connection_id)
            .await
            .ok_or_else(|| SubscriptionError::ConnectionNotFound(connection_id.to_string()))?;

        match connection.identity {
            None => return Err(SubscriptionError::Unauthenticated),
            Some(identity) if identity != user_id => {
                return Err(SubscriptionError::IdentityMismatch {
                    identity: identity.into_string(),
                    requested: user_id.into_string(),
                });
            }
            Some(_) => {}
        }

        let newly_subscribed = self
            .registry
            .subscribe_user(connection_id, user_id.clone())
            .await?;
        Ok((user_id, newly_subscribed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ConnectionIdFactory, ConnectionState, Timestamp},
        infrastructure::repository::InMemoryConnectionRegistry,
    };
    use tokio::sync::mpsc;

    async fn connect(
        registry: &InMemoryConnectionRegistry,
        identity: Option<&str>,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionIdFactory::generate();
        registry
            .add_connection(
                id.clone(),
                identity.map(|i| UserId::new(i.to_string()).unwrap()),
                tx,
                Timestamp::new(0),
            )
            .await
            .unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_register_user_success() {
        // テスト項目: 本人のチャンネルに登録でき、Registered 状態になる
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let (id, _rx) = connect(&registry, Some("u1")).await;
        let usecase = RegisterUserUseCase::new(registry.clone());

        // when (操作):
        let (user_id, newly) = usecase.execute(&id, "u1".to_string()).await.unwrap();

        // then (期待する結果):
        assert!(newly);
        assert_eq!(registry.user_subscribers(&user_id).await, vec![id.clone()]);
        assert_eq!(
            registry.get_connection(&id).await.unwrap().state,
            ConnectionState::Registered
        );
    }

    #[tokio::test]
    async fn test_register_user_is_idempotent() {
        // テスト項目: 二重登録しても購読は 1 つ
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let (id, _rx) = connect(&registry, Some("u1")).await;
        let usecase = RegisterUserUseCase::new(registry.clone());
        usecase.execute(&id, "u1".to_string()).await.unwrap();

        // when (操作):
        let (user_id, newly) = usecase.execute(&id, "u1".to_string()).await.unwrap();

        // then (期待する結果):
        assert!(!newly);
        assert_eq!(registry.user_subscribers(&user_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_anonymous_fails() {
        // テスト項目: 匿名接続はチャンネル登録できない
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let (id, _rx) = connect(&registry, None).await;
        let usecase = RegisterUserUseCase::new(registry.clone());

        // when (操作):
        let result = usecase.execute(&id, "u1".to_string()).await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), SubscriptionError::Unauthenticated);
        assert!(
            registry
                .user_subscribers(&UserId::new("u1".to_string()).unwrap())
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_register_other_user_fails() {
        // テスト項目: 他人のチャンネルは登録できない
        // given (前提条件):
        let registry = Arc::new(InMemoryConnectionRegistry::default());
        let (id, _rx) = connect(&registry, Some("u1")).await;
        let usecase = RegisterUserUseCase::new(registry);

        // when (操作):
        let result = usecase.execute(&id, "u2".to_string()).await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            SubscriptionError::IdentityMismatch {
                identity: "u1".to_string(),
                requested: "u2".to_string()
            }
        );
    }
}
