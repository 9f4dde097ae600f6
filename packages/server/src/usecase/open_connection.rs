//! UseCase: 接続確立／切断
//!
//! トランスポート接続ごとに ConnectionId を払い出し、レジストリに登録します。
//! 切断時は全メンバーシップを破棄します（他コンポーネントへの通知はなし）。

use std::sync::Arc;

use hiroba_shared::time::get_jst_timestamp;

use crate::domain::{
    ConnectionId, ConnectionIdFactory, ConnectionRegistry, ConnectionSnapshot, Outbox,
    RegistryError, Timestamp, User,
};

use super::error::ConnectError;

/// 接続確立のユースケース
pub struct OpenConnectionUseCase {
    registry: Arc<dyn ConnectionRegistry>,
}

impl OpenConnectionUseCase {
    /// 新しい OpenConnectionUseCase を作成
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 接続を登録し、払い出した ID を返す
    ///
    /// # Arguments
    ///
    /// * `identity` - セッションから解決したユーザー（匿名なら None）
    /// * `outbox` - この接続への送信キュー
    pub async fn execute(
        &self,
        identity: Option<&User>,
        outbox: Outbox,
    ) -> Result<ConnectionId, ConnectError> {
        let connection_id = ConnectionIdFactory::generate();
        self.registry
            .add_connection(
                connection_id.clone(),
                identity.map(|user| user.id.clone()),
                outbox,
                Timestamp::new(get_jst_timestamp()),
            )
            .await?;
        Ok(connection_id)
    }
}

/// 切断のユースケース
pub struct CloseConnectionUseCase {
    registry: Arc<dyn ConnectionRegistry>,
}

impl CloseConnectionUseCase {
    /// 新しい CloseConnectionUseCase を作成
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 接続と全メンバーシップを破棄する
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<ConnectionSnapshot, RegistryError> {
        self.registry.remove_connection(connection_id).await
    }
}
