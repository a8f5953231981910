//! Reconnect backoff.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Bounded exponential backoff over consecutive reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    immediate_first: bool,
    initial: Duration,
    max: Duration,
    multiplier: u32,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            immediate_first: config.immediate_first_retry,
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier.max(1),
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;

        let step = if self.immediate_first {
            if self.attempt == 1 {
                return Some(Duration::ZERO);
            }
            self.attempt - 2
        } else {
            self.attempt - 1
        };
        let factor = self.multiplier.saturating_pow(step);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }

    /// Attempts made since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
