use chatwatch_runtime_config::ObserverSettings;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout and backoff for confirming that an observer is reachable.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub base_delay: Duration,
}

impl ConfirmPolicy {
    pub fn from_settings(settings: &ObserverSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.confirm_timeout_ms),
            attempts: settings.confirm_attempts.max(1),
            base_delay: Duration::from_millis(settings.confirm_base_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (0-based): base, 2x, 4x, capped at 16x.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << attempt.min(4))
            .unwrap_or(Duration::MAX)
    }
}

/// Run `probe` under the policy timeout, retrying with exponential backoff.
/// Returns false once the attempts are exhausted.
pub async fn confirm_with_backoff<F, Fut>(policy: &ConfirmPolicy, what: &str, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 0..policy.attempts {
        match tokio::time::timeout(policy.timeout, probe()).await {
            Ok(true) => {
                debug!("Confirmed {} on attempt {}", what, attempt + 1);
                return true;
            }
            Ok(false) | Err(_) => {
                if attempt + 1 < policy.attempts {
                    let next_delay = policy.delay_after(attempt);
                    warn!(
                        "Confirming {} failed (attempt {}/{}), retrying in {}ms...",
                        what,
                        attempt + 1,
                        policy.attempts,
                        next_delay.as_millis()
                    );
                    tokio::time::sleep(next_delay).await;
                }
            }
        }
    }
    warn!("Could not confirm {} after {} attempts", what, policy.attempts);
    false
}
