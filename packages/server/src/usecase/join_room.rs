//! UseCase: ルーム参加
//!
//! 接続をルームのブロードキャスト対象に加えます。二重参加は何もしません。
//! 既存ルームを離れるかどうかはレジストリのメンバーシップポリシー次第です。

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionRegistry, JoinOutcome, RoomKey};

use super::error::SubscriptionError;

/// ルーム参加のユースケース
pub struct JoinRoomUseCase {
    registry: Arc<dyn ConnectionRegistry>,
}

impl JoinRoomUseCase {
    /// 新しい JoinRoomUseCase を作成
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// ルーム参加を実行
    ///
    /// 匿名接続でも参加できる（受信のみ）。
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        room: String,
    ) -> Result<(RoomKey, JoinOutcome), SubscriptionError> {
        let room = RoomKey::new(room)?;
        let outcome = self.registry.join_room(connection_id, room.clone()).await?;
        Ok((room, outcome))
    }
}
