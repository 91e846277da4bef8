//! Retry execution with exponential backoff and rate-limit pauses
//!
//! Every remote call goes through [`BackoffExecutor`], so transient failures
//! and rate limiting are handled the same way for login, listing, and follow
//! operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use humantime::format_duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How the executor should react to a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The service is throttling us. Pause for the long rate-limit window and
    /// retry the same attempt.
    RateLimited {
        /// Advisory reset reported by the service, informational only
        reset_after: Option<Duration>,
    },
    /// Any other failure. Retried with exponential backoff.
    Transient,
}

/// Errors that can be classified for retry purposes
pub trait Retryable {
    fn failure_class(&self) -> FailureClass;
}

/// Retry policy shared by every remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts for non-rate-limit failures
    pub max_retries: u32,
    /// First backoff delay; doubles with each failed attempt
    pub backoff_base: Duration,
    /// Upper bound for a single backoff delay
    pub backoff_cap: Duration,
    /// Fixed pause applied whenever the service reports rate limiting
    pub rate_limit_pause: Duration,
    /// Give up after this many rate-limit pauses for one operation.
    /// `None` keeps waiting for as long as the service keeps throttling.
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            rate_limit_pause: Duration::from_secs(15 * 60),
            max_rate_limit_waits: None,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the zero-based `attempt` failed: `min(base * 2^attempt, cap)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

/// Runs a single remote operation with bounded retries
///
/// Attempts never overlap: each retry starts only after the previous attempt
/// and its pause have completed.
#[derive(Debug, Clone, Default)]
pub struct BackoffExecutor {
    policy: RetryPolicy,
}

impl BackoffExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Execute `operation` using the policy's `max_retries`
    pub async fn execute<F, Fut, T, E>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.execute_with_retries(label, self.policy.max_retries, operation)
            .await
    }

    /// Execute `operation`, allowing at most `max_retries` attempts that fail
    /// with a transient error
    ///
    /// Rate-limited attempts pause for [`RetryPolicy::rate_limit_pause`] and
    /// are retried without using up an attempt or growing the backoff.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, unchanged, once the attempts
    /// are exhausted (or once `max_rate_limit_waits` pauses have been spent).
    pub async fn execute_with_retries<F, Fut, T, E>(
        &self,
        label: &str,
        max_retries: u32,
        operation: F,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = max_retries.max(1);
        let mut failed_attempts = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if failed_attempts > 0 || rate_limit_waits > 0 {
                        debug!(
                            "{} succeeded after {} failed attempt(s) and {} rate-limit pause(s)",
                            label, failed_attempts, rate_limit_waits
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.failure_class() {
                FailureClass::RateLimited { reset_after } => {
                    if let Some(limit) = self.policy.max_rate_limit_waits {
                        if rate_limit_waits >= limit {
                            warn!(
                                "Giving up on {} after {} rate-limit pause(s): {}",
                                label, rate_limit_waits, err
                            );
                            return Err(err);
                        }
                    }
                    rate_limit_waits += 1;
                    self.pause_for_rate_limit(label, reset_after).await;
                }
                FailureClass::Transient => {
                    failed_attempts += 1;
                    if failed_attempts >= max_attempts {
                        warn!(
                            "{} failed after {} attempt(s): {}",
                            label, failed_attempts, err
                        );
                        return Err(err);
                    }

                    let delay = self.policy.backoff_for(failed_attempts - 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}...",
                        label,
                        failed_attempts,
                        max_attempts,
                        err,
                        format_duration(delay)
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn pause_for_rate_limit(&self, label: &str, reset_after: Option<Duration>) {
        let pause = self.policy.rate_limit_pause;
        match reset_after {
            Some(reset) => warn!(
                "Rate limit detected during {} (service reports reset in {}). Pausing operations for {}...",
                label,
                format_duration(reset),
                format_duration(pause)
            ),
            None => warn!(
                "Rate limit detected during {}. Pausing operations for {}...",
                label,
                format_duration(pause)
            ),
        }
        sleep(pause).await;
        info!("Resuming operations");
    }
}
