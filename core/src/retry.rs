//! Bounded retry policy.

use std::time::Duration;

use crate::error::ApiError;

/// How many times a request is attempted and how long to wait in between.
///
/// Either both fields are zero (a single attempt) or both are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 0,
        delay: Duration::ZERO,
    };

    /// Rejects a mismatched pair (one zero, the other not).
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, ApiError> {
        match (max_attempts == 0, delay.is_zero()) {
            (true, true) | (false, false) => Ok(Self {
                max_attempts,
                delay,
            }),
            _ => Err(ApiError::Config(format!(
                "retry count and retry wait must both be set or both be zero \
                 (got count={max_attempts}, wait={delay:?})"
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Total attempts the dispatcher makes, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
