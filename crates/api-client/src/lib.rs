pub mod client;
pub mod source;
pub mod wire;

pub use client::YouTubeClient;
pub use source::{ChatPage, ChatSource, FetchError, FetchRequest};
