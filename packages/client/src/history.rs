//! HTTP access to the history and identity endpoints.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use hiroba_server::infrastructure::dto::{
    http::{MeResponse, MessagesResponse},
    websocket::{MessageDto, UserDto},
};

use crate::{error::ClientError, session::HistorySource};

pub struct HttpHistoryClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpHistoryClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let request = self.http.get(url);
        Ok(match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Identity behind the token; `None` when the server does not know it.
    pub async fn fetch_me(&self) -> Result<Option<UserDto>, ClientError> {
        if self.token.is_none() {
            return Ok(None);
        }
        let response = self.get("/api/me")?.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let me: MeResponse = response.error_for_status()?.json().await?;
        Ok(Some(me.user))
    }

    async fn fetch_messages(&self, query: &[(&str, &str)]) -> Result<Vec<MessageDto>, ClientError> {
        let response = self
            .get("/api/messages")?
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        let body: MessagesResponse = response.json().await?;
        Ok(body.messages)
    }
}

#[async_trait]
impl HistorySource for HttpHistoryClient {
    async fn room_history(&self, room: &str) -> Result<Vec<MessageDto>, ClientError> {
        self.fetch_messages(&[("room", room)]).await
    }

    async fn participant_history(&self, user_id: &str) -> Result<Vec<MessageDto>, ClientError> {
        self.fetch_messages(&[("receiverId", user_id)]).await
    }
}
