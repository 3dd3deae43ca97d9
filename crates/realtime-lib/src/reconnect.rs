//! Reconnection pacing for dropped channel sockets.

use std::time::Duration;

/// Default pause between reconnection attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1500);
/// Default cap on consecutive reconnection attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 999;

/// How the delay grows between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay for every attempt
    Fixed,
    /// Doubles per attempt, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// Retry policy applied after an unexpected close or a failed connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            backoff: Backoff::Fixed,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn exponential(interval: Duration, max_delay: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            backoff: Backoff::Exponential { max_delay },
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait before reconnection attempt number `attempt` (1-based).
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.interval.saturating_mul(factor).min(max_delay)
            },
        };
        Some(delay)
    }
}
