use async_trait::async_trait;
use chatwatch_core::ChatMessage;

/// One page of the upstream chat feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
    pub next_continuation_token: Option<String>,
    pub suggested_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub chat_id: &'a str,
    /// `None` fetches the latest page.
    pub continuation_token: Option<&'a str>,
    pub credential: &'a str,
}

/// Upstream failure. The `Display` text is what gets classified, so it keeps
/// the upstream wording intact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("YouTube API Error: {message}")]
    Api { status: u16, message: String },

    #[error("NetworkError: {0}")]
    Network(String),

    #[error("invalid upstream response: {0}")]
    Decode(String),

    #[error("client setup failed: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// The upstream chat service. The daemon holds it as `Arc<dyn ChatSource>`
/// so tests can script responses.
#[async_trait]
pub trait ChatSource: Send + Sync {
    async fn fetch_page(&self, request: FetchRequest<'_>) -> Result<ChatPage, FetchError>;

    /// Resolve the live chat attached to a video. `Ok(None)` means the video
    /// exists but has no active chat.
    async fn resolve_chat_id(
        &self,
        video_id: &str,
        credential: &str,
    ) -> Result<Option<String>, FetchError>;
}
