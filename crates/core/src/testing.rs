use crate::{Author, ChatMessage, Role};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Message from an author carrying exactly the flag for `role`.
pub fn message(id: &str, role: Role) -> ChatMessage {
    message_at(id, role, base_time() + Duration::seconds(next_id() as i64))
}

/// Like [`message`] with an explicit publish time.
pub fn message_at(id: &str, role: Role, published_at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        author: Author {
            display_name: format!("{}-{id}", role.as_str()),
            avatar_url: None,
            is_owner: role == Role::Owner,
            is_moderator: role == Role::Moderator,
            is_sponsor: role == Role::Sponsor,
        },
        text: format!("text of {id}"),
        published_at,
    }
}

/// Fixed reference time (2024-01-01T00:00:00Z).
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn next_id() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
