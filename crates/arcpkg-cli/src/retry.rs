//! Bounded retry for the two operations allowed to repeat: bulk copies and
//! directory removal.
//!
//! Attempts are counted from 1. The policy never retries past
//! `max_attempts`, and the delay (if any) is fixed rather than exponential.

use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Sleep between a failed attempt and the next one
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Five immediate attempts
    pub const fn transfer_default() -> Self {
        Self::new(5, Duration::ZERO)
    }

    /// Five attempts one second apart, enough to outlast antivirus or indexer holds
    pub const fn removal_default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Result of a retried operation that eventually succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Last error of a retried operation that never succeeded
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// `operation` receives the 1-based attempt number. `on_failure` is called
/// for every failed attempt, including the last, before any sleep.
pub fn retry<T, E, F, L>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_failure: L,
) -> std::result::Result<Attempted<T>, Exhausted<E>>
where
    F: FnMut(u32) -> std::result::Result<T, E>,
    L: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt) {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            },
            Err(error) => {
                on_failure(attempt, &error);
                if attempt >= max_attempts {
                    warn!(attempts = attempt, "Retry budget exhausted");
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
                if !policy.delay.is_zero() {
                    std::thread::sleep(policy.delay);
                }
            },
        }
    }
}
