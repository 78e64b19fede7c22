//! Upstream JSON shapes (YouTube Data API v3).

use chatwatch_core::{Author, ChatMessage};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::source::ChatPage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageList {
    #[serde(default)]
    pub items: Vec<LiveChatMessage>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub polling_interval_millis: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessage {
    pub id: String,
    #[serde(default)]
    pub snippet: Snippet,
    #[serde(default)]
    pub author_details: AuthorDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub display_message: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text_message_details: Option<TextMessageDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageDetails {
    #[serde(default)]
    pub message_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDetails {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub is_chat_owner: bool,
    #[serde(default)]
    pub is_chat_moderator: bool,
    #[serde(default)]
    pub is_chat_sponsor: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoList {
    #[serde(default)]
    pub items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(default)]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    #[serde(default)]
    pub active_live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: Option<String>,
}

impl LiveChatMessage {
    pub fn into_message(self) -> ChatMessage {
        let text = self
            .snippet
            .display_message
            .or_else(|| {
                self.snippet
                    .text_message_details
                    .and_then(|d| d.message_text)
            })
            .unwrap_or_default();
        ChatMessage {
            id: self.id,
            author: Author {
                display_name: self.author_details.display_name,
                avatar_url: self.author_details.profile_image_url,
                is_owner: self.author_details.is_chat_owner,
                is_moderator: self.author_details.is_chat_moderator,
                is_sponsor: self.author_details.is_chat_sponsor,
            },
            text,
            published_at: self.snippet.published_at.unwrap_or_else(Utc::now),
        }
    }
}

impl From<LiveChatMessageList> for ChatPage {
    fn from(list: LiveChatMessageList) -> Self {
        Self {
            messages: list
                .items
                .into_iter()
                .map(LiveChatMessage::into_message)
                .collect(),
            next_continuation_token: list.next_page_token,
            suggested_poll_interval_ms: list.polling_interval_millis.filter(|ms| *ms > 0),
        }
    }
}

impl VideoList {
    pub fn active_chat_id(self) -> Option<String> {
        self.items
            .into_iter()
            .next()
            .and_then(|v| v.live_streaming_details)
            .and_then(|d| d.active_live_chat_id)
            .filter(|id| !id.is_empty())
    }
}

impl ErrorEnvelope {
    /// Message plus the machine-readable reasons, e.g.
    /// `"The request cannot be completed ... quota. [quotaExceeded]"`.
    pub fn describe(&self) -> String {
        let reasons: Vec<&str> = self
            .error
            .errors
            .iter()
            .filter_map(|e| e.reason.as_deref())
            .collect();
        if reasons.is_empty() {
            self.error.message.clone()
        } else {
            format!("{} [{}]", self.error.message, reasons.join(", "))
        }
    }
}
