//! Retention and scheduling defaults.
//!
//! Every value here is only a default; `chatwatch.toml` may override it.

/// Messages retained per stream in the history ledger.
pub const DEFAULT_MAX_MESSAGES_PER_STREAM: usize = 1000;

/// Distinct streams retained in the durable store.
pub const DEFAULT_MAX_STREAMS: usize = 10;

/// Message ids remembered per monitoring session before compaction.
pub const DEFAULT_MAX_DEDUP_IDS: usize = 1000;

/// Delay before the next fetch when the upstream suggests none.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Delay after an ordinary fetch failure.
pub const DEFAULT_ERROR_RETRY_SECS: u64 = 15;

/// Delay after a quota or rate-limit failure.
pub const DEFAULT_QUOTA_RETRY_SECS: u64 = 60;
