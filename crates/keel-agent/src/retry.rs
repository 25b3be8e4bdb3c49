//! Attempt-until-done loops.
//!
//! A [`Retryable`] performs one attempt and classifies its failure as worth
//! retrying or not. A [`RetryStrategy`] drives it until it succeeds, fails
//! fatally, or the policy gives up. All strategies sleep between attempts on
//! the caller's task; nothing runs in the background.

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Failure of a single attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Try again after the strategy's delay.
    Retry(AgentError),
    /// Stop immediately and return this error.
    Abort(AgentError),
}

impl AttemptError {
    /// The underlying error.
    pub fn into_inner(self) -> AgentError {
        match self {
            Self::Retry(e) | Self::Abort(e) => e,
        }
    }
}

/// One unit of work that may need to be repeated.
#[async_trait]
pub trait Retryable: Send {
    /// Perform a single attempt.
    async fn attempt(&mut self) -> std::result::Result<(), AttemptError>;
}

/// Policy that repeatedly invokes a [`Retryable`].
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    /// Run attempts until success, an aborting failure, or the policy gives up.
    async fn try_retryable(&self, retryable: &mut dyn Retryable) -> Result<()>;
}

/// Retries forever with a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct UnlimitedRetryStrategy {
    delay: Duration,
}

impl UnlimitedRetryStrategy {
    /// Create a strategy sleeping `delay` between attempts.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RetryStrategy for UnlimitedRetryStrategy {
    async fn try_retryable(&self, retryable: &mut dyn Retryable) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            match retryable.attempt().await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Abort(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => {
                    tracing::debug!(attempt = attempts, error = %e, "Attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Retries up to a fixed number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRetryStrategy {
    max_attempts: u32,
    delay: Duration,
}

impl AttemptRetryStrategy {
    /// Create a strategy making at most `max_attempts` attempts.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

#[async_trait]
impl RetryStrategy for AttemptRetryStrategy {
    async fn try_retryable(&self, retryable: &mut dyn Retryable) -> Result<()> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match retryable.attempt().await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Abort(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => {
                    if attempts >= max_attempts {
                        tracing::debug!(attempts, error = %e, "Giving up after max attempts");
                        return Err(AgentError::AttemptsExhausted {
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    tracing::debug!(attempt = attempts, max_attempts, error = %e, "Attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Retries until a wall-clock deadline.
///
/// The strategy stops as soon as another delay would cross the deadline, so
/// it never sleeps past it just to fail afterwards.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutRetryStrategy {
    timeout: Duration,
    delay: Duration,
}

impl TimeoutRetryStrategy {
    /// Create a strategy giving up after `timeout`.
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }
}

#[async_trait]
impl RetryStrategy for TimeoutRetryStrategy {
    async fn try_retryable(&self, retryable: &mut dyn Retryable) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match retryable.attempt().await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Abort(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => {
                    if start.elapsed() + self.delay > self.timeout {
                        tracing::debug!(
                            attempts,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            error = %e,
                            "Giving up at deadline"
                        );
                        return Err(AgentError::RetryTimeout {
                            timeout: self.timeout,
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    tracing::debug!(attempt = attempts, error = %e, "Attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
