//! Retry policy for forge requests.
//!
//! The policy is injected into the [`ForgeClient`](super::ForgeClient) rather
//! than hard-coded, and sleeping goes through the [`Sleeper`] trait so tests
//! can observe the backoff schedule without waiting on a real clock.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Default number of attempts for retried endpoints.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How long to wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Double the wait after each failure, never exceeding `max`.
    Exponential {
        /// Wait after the first failure.
        initial: Duration,
        /// Upper bound for any single wait.
        max: Duration,
    },
}

/// Bounded retry with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay strategy between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::Fixed(DEFAULT_BACKOFF),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Effective attempt budget.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Something that can pause the current worker.
pub trait Sleeper: Send + Sync {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration passed to [`Sleeper::sleep`], in call order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|slept| slept.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_five_attempts_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 5);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(4), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff: Backoff::Fixed(Duration::ZERO),
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(500),
            },
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_recording_sleeper_keeps_call_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(3));
        sleeper.sleep(Duration::from_millis(1));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(3), Duration::from_millis(1)]
        );
    }
}
