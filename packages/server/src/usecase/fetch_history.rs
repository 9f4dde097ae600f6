//! UseCase: 履歴取得とセッション解決
//!
//! 履歴はルーム単位（`?room=`）または参加者単位（`?receiverId=`）で
//! created_at 昇順に返します。どちらの指定もなければ空です。

use std::sync::Arc;

use crate::domain::{
    IdentityResolver, Message, MessageRepository, RoomKey, SessionToken, User, UserId,
};

use super::error::HistoryError;

/// セッショントークンからユーザーを解決するユースケース
///
/// 解決できない場合は None（フェイルオープン）。
pub struct AuthenticateUseCase {
    identity: Arc<dyn IdentityResolver>,
}

impl AuthenticateUseCase {
    /// 新しい AuthenticateUseCase を作成
    pub fn new(identity: Arc<dyn IdentityResolver>) -> Self {
        Self { identity }
    }

    /// 生のトークン文字列からユーザーを解決
    pub async fn execute(&self, raw_token: Option<&str>) -> Option<User> {
        let token = SessionToken::new(raw_token?.to_string()).ok()?;
        self.identity.resolve_from_session(&token).await
    }
}

/// 履歴の検索条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    pub room: Option<String>,
    pub receiver_id: Option<String>,
}

/// 履歴取得のユースケース
pub struct FetchHistoryUseCase {
    authenticate: AuthenticateUseCase,
    messages: Arc<dyn MessageRepository>,
}

impl FetchHistoryUseCase {
    /// 新しい FetchHistoryUseCase を作成
    pub fn new(identity: Arc<dyn IdentityResolver>, messages: Arc<dyn MessageRepository>) -> Self {
        Self {
            authenticate: AuthenticateUseCase::new(identity),
            messages,
        }
    }

    /// 履歴取得を実行
    ///
    /// room が優先される。
    pub async fn execute(
        &self,
        raw_token: Option<&str>,
        request: HistoryRequest,
    ) -> Result<Vec<Message>, HistoryError> {
        if self.authenticate.execute(raw_token).await.is_none() {
            return Err(HistoryError::Unauthenticated);
        }

        if let Some(room) = request.room {
            let room = RoomKey::new(room)?;
            return Ok(self.messages.find_by_room(&room).await?);
        }
        if let Some(receiver_id) = request.receiver_id {
            let user_id = UserId::new(receiver_id)?;
            return Ok(self.messages.find_by_participant(&user_id).await?);
        }
        Ok(Vec::new())
    }
}
