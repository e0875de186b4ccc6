//! Reconnect policy: capped linear backoff with an optional retry budget.

use std::time::Duration;

/// When and how often the push connection is re-opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; retry `n` waits `n * base_delay`
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Retries allowed after consecutive failures; `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries
    pub fn no_retries() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    /// Delay to wait after `failures` consecutive failed attempts
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(failures.max(1))
            .min(self.max_delay)
    }

    /// Whether `failures` consecutive failed attempts use up the budget
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_retries.is_some_and(|max| failures > max)
    }
}
