// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Retry-with-backoff utility.
//!
//! This is not wired into the step executor: per the design document,
//! retry of a failed task is the durable queue's responsibility (its
//! sweeper re-claims a task up to `maxRetries`, with backoff computed
//! from the task's own retry count), not something the executor layers
//! on top of an individual provisioner call. The policy and executor
//! here are kept as a general-purpose utility for callers that do need
//! in-process retry — a provisioner implementation calling a flaky
//! downstream API, for instance.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs `operation` until it succeeds or `max_attempts` is
    /// exhausted, sleeping with exponential backoff between attempts.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        return Err(err);
                    }
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt - 1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_attempt() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_max_attempts_then_gives_up() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0, Duration::from_millis(5));
        let executor = RetryExecutor::new(policy);
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0, Duration::from_millis(5));
        let executor = RetryExecutor::new(policy);
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = executor
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("boom")
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
    }
}
