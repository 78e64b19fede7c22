//! Per-stream history of accepted comments.
//!
//! The in-memory copy of the active stream is authoritative while a session
//! runs; the store holds one durable record per stream.

use chatwatch_core::Comment;
use chatwatch_local_store::{get_json, set_json, KvStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const HISTORY_KEY_PREFIX: &str = "comments_history:";

pub fn history_key(stream_id: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}{stream_id}")
}

pub struct HistoryLedger {
    store: Arc<dyn KvStore>,
    max_messages: usize,
    max_streams: usize,
    memory: HashMap<String, Vec<Comment>>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn KvStore>, max_messages: usize, max_streams: usize) -> Self {
        Self {
            store,
            max_messages: max_messages.max(1),
            max_streams: max_streams.max(1),
            memory: HashMap::new(),
        }
    }

    /// Make `stream_id` resident, reading the durable copy only when no
    /// in-memory copy exists. Returns the resident length.
    pub async fn load(&mut self, stream_id: &str) -> Result<usize, StoreError> {
        if let Some(existing) = self.memory.get(stream_id) {
            return Ok(existing.len());
        }
        let durable = self.read_durable(stream_id).await?;
        let len = durable.len();
        self.memory.insert(stream_id.to_string(), durable);
        Ok(len)
    }

    /// Append in acceptance order, dropping from the front beyond the cap.
    pub fn append(&mut self, stream_id: &str, comments: Vec<Comment>) -> usize {
        let entries = self.memory.entry(stream_id.to_string()).or_default();
        entries.extend(comments);
        if entries.len() > self.max_messages {
            let excess = entries.len() - self.max_messages;
            entries.drain(..excess);
        }
        entries.len()
    }

    pub fn is_resident(&self, stream_id: &str) -> bool {
        self.memory.contains_key(stream_id)
    }

    /// Copy of the resident entries; empty when not resident.
    pub fn snapshot(&self, stream_id: &str) -> Vec<Comment> {
        self.memory.get(stream_id).cloned().unwrap_or_default()
    }

    pub fn len(&self, stream_id: &str) -> usize {
        self.memory.get(stream_id).map_or(0, Vec::len)
    }

    pub fn release(&mut self, stream_id: &str) {
        self.memory.remove(stream_id);
    }

    /// Drop every resident stream except `stream_id`.
    pub fn retain_only(&mut self, stream_id: &str) {
        self.memory.retain(|key, _| key == stream_id);
    }

    pub async fn read_durable(&self, stream_id: &str) -> Result<Vec<Comment>, StoreError> {
        let stored: Option<Vec<Comment>> = get_json(self.store.as_ref(), &history_key(stream_id)).await?;
        Ok(stored.unwrap_or_default())
    }

    /// Write the resident copy and read it back. A length mismatch is logged.
    pub async fn persist(&self, stream_id: &str) -> Result<(), StoreError> {
        let Some(entries) = self.memory.get(stream_id) else {
            return Ok(());
        };
        let key = history_key(stream_id);
        set_json(self.store.as_ref(), &key, entries).await?;

        let written = self.read_durable(stream_id).await?;
        if written.len() != entries.len() {
            warn!(
                stream_id,
                expected = entries.len(),
                actual = written.len(),
                "History read-back mismatch"
            );
        } else {
            debug!(stream_id, len = entries.len(), "History persisted");
        }
        Ok(())
    }

    /// Keep the `max_streams` durable records whose newest entry is most
    /// recent and remove the rest. Returns the evicted stream ids.
    pub async fn evict_oldest_streams_beyond_cap(&mut self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.keys(HISTORY_KEY_PREFIX).await?;
        if keys.len() <= self.max_streams {
            return Ok(Vec::new());
        }

        let mut ranked = Vec::with_capacity(keys.len());
        for key in keys {
            let stream_id = key
                .strip_prefix(HISTORY_KEY_PREFIX)
                .unwrap_or(&key)
                .to_string();
            let newest = match get_json::<Vec<Comment>>(self.store.as_ref(), &key).await {
                Ok(entries) => entries
                    .unwrap_or_default()
                    .iter()
                    .map(Comment::published_at)
                    .max(),
                Err(e) => {
                    warn!(stream_id, "Unreadable history record: {e}");
                    None
                }
            };
            ranked.push((newest, stream_id));
        }
        // newest first; records without entries rank last
        ranked.sort_by(|a, b| b.cmp(a));

        let mut evicted = Vec::new();
        for (_, stream_id) in ranked.into_iter().skip(self.max_streams) {
            self.store.remove(&history_key(&stream_id)).await?;
            self.memory.remove(&stream_id);
            evicted.push(stream_id);
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwatch_core::testing;
    use chatwatch_core::Role;
    use chatwatch_local_store::MemoryStore;
    use chrono::Duration;

    fn comment(id: &str) -> Comment {
        Comment::from(testing::message(id, Role::Owner))
    }

    fn comment_at(id: &str, offset_secs: i64) -> Comment {
        Comment::from(testing::message_at(
            id,
            Role::Owner,
            testing::base_time() + Duration::seconds(offset_secs),
        ))
    }

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(Comment::id).collect()
    }

    #[tokio::test]
    async fn test_cap_keeps_most_recent_in_order() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(store, 3, 10);

        assert_eq!(ledger.append("abc", vec![comment("m1"), comment("m2")]), 2);
        assert_eq!(
            ledger.append("abc", vec![comment("m3"), comment("m4"), comment("m5")]),
            3
        );
        assert_eq!(ids(&ledger.snapshot("abc")), vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn test_persist_then_load_in_new_ledger() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(Arc::clone(&store), 100, 10);
        ledger.append("abc", vec![comment("m1"), comment("m2")]);
        ledger.persist("abc").await.unwrap();

        let mut restarted = HistoryLedger::new(store, 100, 10);
        assert!(!restarted.is_resident("abc"));
        assert_eq!(restarted.load("abc").await.unwrap(), 2);
        assert_eq!(ids(&restarted.snapshot("abc")), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_load_prefers_memory() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(Arc::clone(&store), 100, 10);
        ledger.append("abc", vec![comment("m1")]);
        ledger.persist("abc").await.unwrap();
        ledger.append("abc", vec![comment("m2")]);

        // unpersisted m2 stays
        assert_eq!(ledger.load("abc").await.unwrap(), 2);

        ledger.release("abc");
        assert_eq!(ledger.load("abc").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retain_only() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(store, 100, 10);
        ledger.append("abc", vec![comment("m1")]);
        ledger.append("xyz", vec![comment("m2")]);
        ledger.retain_only("xyz");
        assert!(!ledger.is_resident("abc"));
        assert_eq!(ledger.len("xyz"), 1);
    }

    #[tokio::test]
    async fn test_eviction_keeps_most_recent_streams() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(Arc::clone(&store), 100, 2);
        ledger.append("old", vec![comment_at("a", 10)]);
        ledger.append("mid", vec![comment_at("b", 5), comment_at("c", 20)]);
        ledger.append("new", vec![comment_at("d", 30)]);
        for stream in ["old", "mid", "new"] {
            ledger.persist(stream).await.unwrap();
        }
        set_json(store.as_ref(), &history_key("empty"), &Vec::<Comment>::new())
            .await
            .unwrap();

        let mut evicted = ledger.evict_oldest_streams_beyond_cap().await.unwrap();
        evicted.sort();
        assert_eq!(evicted, vec!["empty".to_string(), "old".to_string()]);

        let remaining = store.keys(HISTORY_KEY_PREFIX).await.unwrap();
        assert_eq!(remaining, vec![history_key("mid"), history_key("new")]);
    }

    #[tokio::test]
    async fn test_eviction_noop_under_cap() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut ledger = HistoryLedger::new(Arc::clone(&store), 100, 10);
        ledger.append("abc", vec![comment("m1")]);
        ledger.persist("abc").await.unwrap();
        assert!(ledger.evict_oldest_streams_beyond_cap().await.unwrap().is_empty());
        assert_eq!(store.keys(HISTORY_KEY_PREFIX).await.unwrap().len(), 1);
    }
}
