//! # Retry Backoff
//!
//! Purpose: Retry a fallible operation with a growing delay. Nothing in the
//! client retries implicitly; callers opt in by wrapping a call.
//!
//! Delays grow along the Fibonacci sequence (`1, 1, 2, 3, 5, ...` times the
//! base interval), not exponentially.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Attempts made before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base delay multiplied by `fibonacci(attempt)`.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Retry policy for one described operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    description: String,
    max_attempts: u32,
    interval: Duration,
}

impl Backoff {
    pub fn new(description: impl Into<String>) -> Self {
        Backoff {
            description: description.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Sets the total number of attempts (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.interval.saturating_mul(fibonacci(attempt))
    }

    /// Runs `op` until it succeeds or the attempts are exhausted, returning
    /// the last error in the latter case.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay(attempt);
                    warn!(
                        operation = %self.description,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// `fibonacci(0) = 0`, `fibonacci(1) = 1`; saturates instead of overflowing.
pub fn fibonacci(n: u32) -> u32 {
    let (mut a, mut b) = (0u32, 1u32);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}
