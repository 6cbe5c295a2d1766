//! Bounded, blocking retry.
//!
//! A [`RetryPolicy`] is a plain value: attempt bound plus backoff curve. The
//! caller supplies the retryable-error predicate and the operation at the
//! call site, so the policy can be tested without any I/O.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Retry policy for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// A policy that cannot retry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidPolicy {
    #[error("max_attempts must be at least 2, got {0}")]
    TooFewAttempts(u32),

    #[error("backoff_multiplier must be >= 1.0, got {0}")]
    ShrinkingBackoff(f64),
}

/// The last error seen, and how many attempts were made before giving up
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Blocks the current thread between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl RetryPolicy {
    /// Fixed delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Reject policies that would give up after a single attempt
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        if self.max_attempts < 2 {
            return Err(InvalidPolicy::TooFewAttempts(self.max_attempts));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(InvalidPolicy::ShrinkingBackoff(self.backoff_multiplier));
        }
        Ok(())
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// `op` receives the 1-indexed attempt number and must issue the same
    /// request every time.
    pub fn run<T, E, P, F>(
        &self,
        sleeper: &dyn Sleeper,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, Attempted<E>>
    where
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if is_retryable(&error) && self.should_retry(attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Attempt failed, retrying"
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(Attempted {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::Sleeper;

    /// Records requested delays instead of sleeping
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }
}
