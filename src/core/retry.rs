//! Retry logic with exponential backoff
//!
//! Used inside driver-set primitives for transient provider failures. The
//! orchestrator itself never retries a region.

use crate::core::error::DriverError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Errors that know whether a retry may help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DriverError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Options for retry behavior
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use ami_publisher::core::{DriverError, RetryManager, RetryOptions};
///
/// # async fn example() -> Result<(), DriverError> {
/// let manager = RetryManager::new(RetryOptions::default());
///
/// let image_id = manager
///     .retry(|| async { Ok::<_, DriverError>("ami-0abc".to_string()) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Execute the given async operation with retry logic
    ///
    /// Non-retryable errors are returned immediately. After the last
    /// attempt the last error is returned.
    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.options.max_attempts {
                        return Err(error);
                    }

                    debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying provider call");
                    sleep(delay).await;

                    delay = Duration::from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}
