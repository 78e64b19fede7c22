use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::source::{ChatPage, ChatSource, FetchError, FetchRequest};
use crate::wire::{ErrorEnvelope, LiveChatMessageList, VideoList};

/// HTTP client for the YouTube Data API v3 live chat endpoints.
pub struct YouTubeClient {
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatSource for YouTubeClient {
    async fn fetch_page(&self, request: FetchRequest<'_>) -> Result<ChatPage, FetchError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("liveChatId", request.chat_id),
            ("part", "snippet,authorDetails"),
            ("key", request.credential),
        ];
        if let Some(token) = request.continuation_token {
            query.push(("pageToken", token));
        }

        let resp = self
            .client
            .get(self.url("/liveChat/messages"))
            .query(&query)
            .send()
            .await?;
        let list: LiveChatMessageList = parse_response(resp).await?;
        let page = ChatPage::from(list);
        tracing::debug!(
            chat_id = request.chat_id,
            count = page.messages.len(),
            "fetched chat page"
        );
        Ok(page)
    }

    async fn resolve_chat_id(
        &self,
        video_id: &str,
        credential: &str,
    ) -> Result<Option<String>, FetchError> {
        let resp = self
            .client
            .get(self.url("/videos"))
            .query(&[
                ("part", "liveStreamingDetails"),
                ("id", video_id),
                ("key", credential),
            ])
            .send()
            .await?;
        let list: VideoList = parse_response(resp).await?;
        Ok(list.active_chat_id())
    }
}

/// Parse a successful JSON body, or turn an error status into
/// [`FetchError::Api`] carrying the upstream message and reasons.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => envelope.describe(),
            Err(_) if body.trim().is_empty() => status.to_string(),
            Err(_) => body,
        };
        return Err(FetchError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
}
