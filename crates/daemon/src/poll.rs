use chatwatch_core::ErrorKind;
use chatwatch_runtime_config::EngineSettings;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::EngineMessage;

/// Delays between fetches.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub default_interval: Duration,
    pub error_retry: Duration,
    pub throttle_retry: Duration,
}

impl PollSettings {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            default_interval: Duration::from_millis(settings.default_poll_interval_ms),
            error_retry: Duration::from_secs(settings.error_retry_secs),
            throttle_retry: Duration::from_secs(settings.quota_retry_secs),
        }
    }

    /// Upstream-suggested interval when present and non-zero.
    pub fn success_delay(&self, suggested_ms: Option<u64>) -> Duration {
        match suggested_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.default_interval,
        }
    }

    pub fn failure_delay(&self, kind: ErrorKind) -> Duration {
        if kind.is_throttle() {
            self.throttle_retry
        } else {
            self.error_retry
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

/// Pending wake-up for one session. Dropping it cancels the wake-up.
#[derive(Debug)]
pub struct PollTimer {
    handle: JoinHandle<()>,
}

impl PollTimer {
    pub fn schedule(
        delay: Duration,
        tx: mpsc::UnboundedSender<EngineMessage>,
        session_id: u64,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineMessage::TimerFired { session_id });
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
