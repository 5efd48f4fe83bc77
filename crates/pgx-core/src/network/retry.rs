//! Retry policy with exponential backoff.
//!
//! Only failure kinds listed in the policy are reissued. Backoff waits go
//! through the pipeline's cancellation token so an abort never sits out a
//! full delay.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::error::FetchErrorKind;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behaviour for one resilient client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub jitter: bool,
    /// Failure kinds that may be reissued.
    pub retryable: Vec<FetchErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_ATTEMPTS,
            base_delay: NetworkConfig::RETRY_BASE_DELAY,
            backoff_multiplier: NetworkConfig::RETRY_BACKOFF_MULTIPLIER,
            max_delay: NetworkConfig::RETRY_MAX_DELAY,
            jitter: false,
            retryable: vec![
                FetchErrorKind::RateLimited,
                FetchErrorKind::TransientNetworkError,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never reissues a request.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = FetchErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: FetchErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(retry as i32);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let mut rng = rand::rng();
            let factor = rng.random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs.max(0.0))
    }
}

/// Statistics about a retry run.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Why a retry run stopped without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The last attempt's error, either non-retryable or final.
    Failed(E),
    /// The token fired before or between attempts.
    Cancelled,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn retry_async<F, Fut, T, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, RetryError<E>>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return (Err(RetryError::Cancelled), stats);
        }
        stats.attempts = attempt + 1;

        let error = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };
        stats.last_error = Some(error.to_string());

        if !should_retry(&error) {
            debug!("Error is not retryable: {}", error);
            return (Err(RetryError::Failed(error)), stats);
        }

        if attempt + 1 >= max_attempts {
            warn!(
                "All {} attempts exhausted. Last error: {}",
                max_attempts, error
            );
            return (Err(RetryError::Failed(error)), stats);
        }

        let delay = policy.calculate_delay(attempt);
        stats.total_delay += delay;
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            max_attempts,
            error,
            delay
        );

        if cancel.sleep(delay).await.is_err() {
            return (Err(RetryError::Cancelled), stats);
        }
        attempt += 1;
    }
}
