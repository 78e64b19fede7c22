use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message as reported upstream.
///
/// The three role flags are not mutually exclusive on the wire (a channel
/// owner is frequently also flagged as a moderator); [`classify`] collapses
/// them into a single [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_moderator: bool,
    #[serde(default)]
    pub is_sponsor: bool,
}

/// A raw chat message as fetched from the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique per message and stable across pages.
    pub id: String,
    pub author: Author,
    pub text: String,
    pub published_at: DateTime<Utc>,
}

/// Author role. Exactly one applies to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Moderator,
    Sponsor,
    Normal,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Owner, Role::Moderator, Role::Sponsor, Role::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Moderator => "moderator",
            Self::Sponsor => "sponsor",
            Self::Normal => "normal",
        }
    }
}

/// Which roles are admitted into the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub owner: bool,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub sponsor: bool,
    #[serde(default)]
    pub normal: bool,
}

/// Owner and moderator messages only.
pub const DEFAULT_FILTER_CONFIG: FilterConfig = FilterConfig {
    owner: true,
    moderator: true,
    sponsor: false,
    normal: false,
};

impl Default for FilterConfig {
    fn default() -> Self {
        DEFAULT_FILTER_CONFIG
    }
}

impl FilterConfig {
    pub const ALL_ROLES: FilterConfig = FilterConfig {
        owner: true,
        moderator: true,
        sponsor: true,
        normal: true,
    };

    pub fn include(&self, role: Role) -> bool {
        include(role, self)
    }
}

/// Collapse the author flags into one role: owner > moderator > sponsor > normal.
pub fn classify(message: &ChatMessage) -> Role {
    let author = &message.author;
    if author.is_owner {
        Role::Owner
    } else if author.is_moderator {
        Role::Moderator
    } else if author.is_sponsor {
        Role::Sponsor
    } else {
        Role::Normal
    }
}

pub fn include(role: Role, filters: &FilterConfig) -> bool {
    match role {
        Role::Owner => filters.owner,
        Role::Moderator => filters.moderator,
        Role::Sponsor => filters.sponsor,
        Role::Normal => filters.normal,
    }
}

/// An accepted message together with its classified role. This is what the
/// history stores and what observers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub role: Role,
    #[serde(flatten)]
    pub message: ChatMessage,
}

impl Comment {
    pub fn id(&self) -> &str {
        &self.message.id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.message.published_at
    }
}

impl From<ChatMessage> for Comment {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: classify(&message),
            message,
        }
    }
}
