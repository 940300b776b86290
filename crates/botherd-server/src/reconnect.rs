//! Auto-reconnect policy.
//!
//! The default retries forever after a fixed delay. A growth `factor`
//! above 1.0 turns the delay exponential, clamped to `max_delay`, and
//! `max_attempts` bounds the number of consecutive retries.

use std::time::Duration;

use botherd_shared::constants::{DEFAULT_RECONNECT_DELAY_SECS, DEFAULT_RECONNECT_MAX_DELAY_SECS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Whether unexpected disconnects schedule a retry at all.
    pub enabled: bool,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplicative growth per consecutive retry (`1.0` = fixed delay).
    pub factor: f64,
    /// Cap for grown delays.
    pub max_delay: Duration,
    /// Consecutive retries allowed before giving up; `None` = unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            factor: 1.0,
            max_delay: Duration::from_secs(DEFAULT_RECONNECT_MAX_DELAY_SECS),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed), or `None` when no
    /// retry should be scheduled.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        if self.factor <= 1.0 || !self.factor.is_finite() {
            return Some(self.delay);
        }

        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.delay.as_secs_f64() * self.factor.powi(exp);
        let cap = self.max_delay.max(self.delay);
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return Some(cap);
        }
        Some(Duration::from_secs_f64(secs))
    }
}
