use std::collections::{HashSet, VecDeque};

use crate::limits::DEFAULT_MAX_DEDUP_IDS;

/// Bounded set of message ids already processed in the current monitoring
/// session.
///
/// When more than `cap` ids are recorded, only the most recently admitted
/// half is retained.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    cap: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEDUP_IDS)
    }
}

impl Deduplicator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Record `id`. Returns `false` if it was already recorded this session.
    pub fn admit(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        if self.order.len() > self.cap {
            self.compact();
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Forget everything (new session).
    pub fn reset(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    fn compact(&mut self) {
        let keep = (self.cap / 2).max(1);
        while self.order.len() > keep {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}
