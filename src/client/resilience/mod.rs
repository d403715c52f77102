//! Retry policy for idempotent requests.
//!
//! Only GETs and the initial connection of a streaming run go through
//! [`Retry`]; creates, updates and deletes are sent exactly once.

mod backoff;

pub use backoff::ExponentialBackoff;

use std::future::Future;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: ExponentialBackoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Runs an operation until it succeeds, fails permanently, or runs out of attempts.
pub struct Retry<'a> {
    config: &'a RetryConfig,
}

impl<'a> Retry<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self { config }
    }

    /// `operation` receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.max_attempts && Self::should_retry(&e) => {
                    let delay = self.config.backoff.delay_for(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed, retrying",
                        label
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }
}
