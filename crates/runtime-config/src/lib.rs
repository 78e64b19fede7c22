//! Daemon configuration types.
//!
//! `chatwatch-daemon` reads `chatwatch.toml` into [`WatchConfig`]. Path
//! resolution and file loading live in the daemon crate.

use chatwatch_core::limits::{
    DEFAULT_ERROR_RETRY_SECS, DEFAULT_MAX_DEDUP_IDS, DEFAULT_MAX_MESSAGES_PER_STREAM,
    DEFAULT_MAX_STREAMS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUOTA_RETRY_SECS,
};
use chatwatch_core::FilterConfig;
use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "chatwatch.toml";

/// Top-level configuration (persisted as `chatwatch.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    /// Filter used until an observer sets one.
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub observer: ObserverSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub default_poll_interval_ms: u64,
    #[serde(default = "default_error_retry_secs")]
    pub error_retry_secs: u64,
    #[serde(default = "default_quota_retry_secs")]
    pub quota_retry_secs: u64,
    /// Resume a session that was active when the daemon last exited.
    #[serde(default = "default_true")]
    pub resume_on_startup: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            error_retry_secs: DEFAULT_ERROR_RETRY_SECS,
            quota_retry_secs: DEFAULT_QUOTA_RETRY_SECS,
            resume_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default = "default_max_messages_per_stream")]
    pub max_messages_per_stream: usize,
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,
    #[serde(default = "default_max_dedup_ids")]
    pub max_dedup_ids: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_messages_per_stream: DEFAULT_MAX_MESSAGES_PER_STREAM,
            max_streams: DEFAULT_MAX_STREAMS,
            max_dedup_ids: DEFAULT_MAX_DEDUP_IDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Fallback credential; one saved through the control surface wins.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Confirmation that an observer is attached (used when resuming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverSettings {
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,
    #[serde(default = "default_confirm_base_delay_ms")]
    pub confirm_base_delay_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: default_confirm_timeout_ms(),
            confirm_attempts: default_confirm_attempts(),
            confirm_base_delay_ms: default_confirm_base_delay_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    /// SQLite file; empty means the platform default.
    #[serde(default)]
    pub path: String,
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_error_retry_secs() -> u64 {
    DEFAULT_ERROR_RETRY_SECS
}
fn default_quota_retry_secs() -> u64 {
    DEFAULT_QUOTA_RETRY_SECS
}
fn default_max_messages_per_stream() -> usize {
    DEFAULT_MAX_MESSAGES_PER_STREAM
}
fn default_max_streams() -> usize {
    DEFAULT_MAX_STREAMS
}
fn default_max_dedup_ids() -> usize {
    DEFAULT_MAX_DEDUP_IDS
}
fn default_upstream_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_confirm_timeout_ms() -> u64 {
    2_000
}
fn default_confirm_attempts() -> u32 {
    3
}
fn default_confirm_base_delay_ms() -> u64 {
    500
}
fn default_event_buffer() -> usize {
    256
}
fn default_bind() -> String {
    "127.0.0.1:7733".to_string()
}

/// Replace values that would stall or disable the engine with their defaults.
/// Returns true when any field was updated.
pub fn apply_sanity_fallbacks(config: &mut WatchConfig) -> bool {
    let mut changed = false;

    if config.engine.default_poll_interval_ms == 0 {
        config.engine.default_poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        changed = true;
    }
    if config.engine.error_retry_secs == 0 {
        config.engine.error_retry_secs = DEFAULT_ERROR_RETRY_SECS;
        changed = true;
    }
    if config.engine.quota_retry_secs == 0 {
        config.engine.quota_retry_secs = DEFAULT_QUOTA_RETRY_SECS;
        changed = true;
    }
    if config.retention.max_messages_per_stream == 0 {
        config.retention.max_messages_per_stream = DEFAULT_MAX_MESSAGES_PER_STREAM;
        changed = true;
    }
    if config.retention.max_streams == 0 {
        config.retention.max_streams = DEFAULT_MAX_STREAMS;
        changed = true;
    }
    if config.retention.max_dedup_ids < 2 {
        config.retention.max_dedup_ids = DEFAULT_MAX_DEDUP_IDS;
        changed = true;
    }
    if config.observer.confirm_attempts == 0 {
        config.observer.confirm_attempts = default_confirm_attempts();
        changed = true;
    }
    if config.observer.event_buffer == 0 {
        config.observer.event_buffer = default_event_buffer();
        changed = true;
    }

    changed
}
