//! Remote paginated source and archive source.
//!
//! [`RemoteSource`] is the seam the engine talks to; [`HttpRemote`] is the
//! production implementation over the backend's REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use convoy_shared::{ArchiveDay, ArchiveDayMessages, ChatRoom, MessagePage, RoomId};

use crate::error::{Result, SyncError};

/// Query for one page of a room's messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    /// Only messages created after this instant.
    pub after: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            after: None,
        }
    }
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_rooms(&self) -> Result<Vec<ChatRoom>>;

    async fn fetch_room(&self, room_id: &RoomId) -> Result<ChatRoom>;

    /// Page 1 holds the newest messages.
    async fn fetch_messages(&self, room_id: &RoomId, request: &PageRequest) -> Result<MessagePage>;

    /// Same shape as [`RemoteSource::fetch_messages`], file messages only.
    async fn fetch_file_messages(
        &self,
        room_id: &RoomId,
        request: &PageRequest,
    ) -> Result<MessagePage>;

    async fn fetch_archive_days(&self, room_id: &RoomId) -> Result<Vec<ArchiveDay>>;

    async fn fetch_archive_day(
        &self,
        room_id: &RoomId,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<ArchiveDayMessages>;
}

/// REST client for the chat backend.
pub struct HttpRemote {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn page_query(room_id: &RoomId, request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("room", room_id.to_string()),
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(after) = request.after {
            query.push(("after", after.to_rfc3339()));
        }
        query
    }
}

/// Turn a non-2xx response into [`SyncError::Http`], preferring the
/// backend's `message` field.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    tracing::debug!(status = status.as_u16(), %message, "remote request failed");
    Err(SyncError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_rooms(&self) -> Result<Vec<ChatRoom>> {
        self.send_json(self.get("rooms")).await
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<ChatRoom> {
        match self.send_json(self.get(&format!("room/{room_id}"))).await {
            Err(SyncError::Http { status: 404, .. }) => Err(SyncError::RoomNotFound(room_id.clone())),
            other => other,
        }
    }

    async fn fetch_messages(&self, room_id: &RoomId, request: &PageRequest) -> Result<MessagePage> {
        let query = Self::page_query(room_id, request);
        self.send_json(self.get("messages").query(&query)).await
    }

    async fn fetch_file_messages(
        &self,
        room_id: &RoomId,
        request: &PageRequest,
    ) -> Result<MessagePage> {
        let query = Self::page_query(room_id, request);
        self.send_json(self.get("messages/files").query(&query)).await
    }

    async fn fetch_archive_days(&self, room_id: &RoomId) -> Result<Vec<ArchiveDay>> {
        self.send_json(self.get("archive/days").query(&[("room", room_id.as_str())]))
            .await
    }

    async fn fetch_archive_day(
        &self,
        room_id: &RoomId,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<ArchiveDayMessages> {
        self.send_json(self.get(&format!("archive/{room_id}/{year}/{month}/{day}")))
            .await
    }
}
