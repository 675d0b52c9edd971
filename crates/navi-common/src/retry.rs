use crate::error::NaviError;
use std::time::Duration;

/// Delay applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry immediately. Used for storage processor failover, where the next
    /// attempt goes to the other processor anyway.
    None,
    /// Exponential backoff capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(retry.saturating_sub(1) as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(max)
            }
        }
    }
}

/// Retry behaviour for one dispatch call.
///
/// The policy is passed explicitly to each call rather than wrapped around a
/// function, so callers can pick a stricter or looser policy per command.
///
/// # Example
///
/// ```
/// use navi_common::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(5)
///     .with_backoff(Backoff::Exponential {
///         initial: Duration::from_millis(50),
///         max: Duration::from_secs(5),
///         multiplier: 2.0,
///     });
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Decides whether an error is worth another attempt.
    pub retry_on: fn(&NaviError) -> bool,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Up to three attempts, retrying node-down errors immediately.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_on: NaviError::is_retryable,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_on(mut self, retry_on: fn(&NaviError) -> bool) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether `error`, raised by attempt number `attempt` (1-based), should
    /// be followed by another attempt.
    pub fn should_retry(&self, error: &NaviError, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1) && (self.retry_on)(error)
    }
}
