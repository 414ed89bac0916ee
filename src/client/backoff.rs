//! Reconnect backoff policy

use std::time::Duration;

use crate::protocol::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_ATTEMPTS};

/// Exponential backoff: `base * 2^(attempt-1)`, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Largest delay between retries
    pub cap: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Whether retry number `attempt` is still within budget
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}
