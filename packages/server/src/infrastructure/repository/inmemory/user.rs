//! InMemory ユーザーディレクトリ実装
//!
//! UserRepository と IdentityResolver の両方を実装します。
//! 起動時に JSON シードファイルから読み込みます。

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{IdentityResolver, SessionToken, User, UserId, UserRepository, ValueObjectError};

/// シードファイル読み込みエラー
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read user seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse user seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid user seed: {0}")]
    Invalid(#[from] ValueObjectError),
}

/// シードファイルの 1 レコード
///
/// ```json
/// [{ "id": "u1", "name": "Alice", "email": "alice@example.com", "token": "alice-token" }]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub id: String,
    pub name: String,
    pub email: String,
    /// 省略時はセッションを持たない（表示名解決のみに使われる）
    pub token: Option<String>,
}

/// インメモリユーザーディレクトリ
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<UserId, User>,
    /// token -> user id
    sessions: HashMap<String, UserId>,
}

impl InMemoryUserDirectory {
    /// ユーザーとセッショントークンの組から作成
    pub fn new(entries: Vec<(User, Option<SessionToken>)>) -> Self {
        let mut directory = Self::default();
        for (user, token) in entries {
            if let Some(token) = token {
                directory
                    .sessions
                    .insert(token.as_str().to_string(), user.id.clone());
            }
            directory.users.insert(user.id.clone(), user);
        }
        directory
    }

    /// シードレコードから作成
    pub fn from_seeds(seeds: Vec<UserSeed>) -> Result<Self, SeedError> {
        let entries = seeds
            .into_iter()
            .map(|seed| -> Result<_, SeedError> {
                let user = User::new(UserId::new(seed.id)?, seed.name, seed.email);
                let token = seed.token.map(SessionToken::new).transpose()?;
                Ok((user, token))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    /// JSON シードファイルから読み込み
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        let seeds: Vec<UserSeed> = serde_json::from_str(&raw)?;
        let directory = Self::from_seeds(seeds)?;
        tracing::info!(
            "Loaded {} users ({} sessions) from {}",
            directory.users.len(),
            directory.sessions.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserDirectory {
    async fn find_by_id(&self, user_id: &UserId) -> Option<User> {
        self.users.get(user_id).cloned()
    }
}

#[async_trait]
impl IdentityResolver for InMemoryUserDirectory {
    async fn resolve_from_session(&self, token: &SessionToken) -> Option<User> {
        let user_id = self.sessions.get(token.as_str())?;
        self.users.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<UserSeed> {
        serde_json::from_str(
            r#"[
                {"id": "u1", "name": "Alice", "email": "alice@example.com", "token": "alice-token"},
                {"id": "u2", "name": "Bob", "email": "bob@example.com"}
            ]"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_known_token() {
        // テスト項目: 既知のトークンからユーザーを解決できる
        // given (前提条件):
        let directory = InMemoryUserDirectory::from_seeds(seeds()).unwrap();
        let token = SessionToken::new("alice-token".to_string()).unwrap();

        // when (操作):
        let user = directory.resolve_from_session(&token).await;

        // then (期待する結果):
        let user = user.unwrap();
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.name, "Alice");
    }

    #[tokio::test]
    async fn test_resolve_unknown_token_fails_open() {
        // テスト項目: 未知のトークンはエラーではなく None になる
        // given (前提条件):
        let directory = InMemoryUserDirectory::from_seeds(seeds()).unwrap();
        let token = SessionToken::new("forged".to_string()).unwrap();

        // when (操作):
        let user = directory.resolve_from_session(&token).await;

        // then (期待する結果):
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_user_without_token_is_still_findable() {
        // テスト項目: トークンのないユーザーも ID で検索できる
        // given (前提条件):
        let directory = InMemoryUserDirectory::from_seeds(seeds()).unwrap();

        // when (操作):
        let bob = directory
            .find_by_id(&UserId::new("u2".to_string()).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(bob.unwrap().name, "Bob");
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_invalid_seed_is_rejected() {
        // テスト項目: 空の ID を含むシードは拒否される
        // given (前提条件):
        let seeds = vec![UserSeed {
            id: String::new(),
            name: "Nobody".to_string(),
            email: "nobody@example.com".to_string(),
            token: None,
        }];

        // when (操作):
        let result = InMemoryUserDirectory::from_seeds(seeds);

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(SeedError::Invalid(ValueObjectError::UserIdEmpty))
        ));
    }
}
