//! Per-source request spacing.
//!
//! Wraps a governor direct limiter with a burst of one, so consecutive calls
//! through the same source are at least `min_interval` apart. governor's GCRA
//! state is updated with a compare-and-swap, which keeps concurrent callers
//! from both observing a stale "last request" and bursting together.

use crate::cancel::{CancellationToken, CancelledError};
use crate::config::interval_for_rate;
use governor::{DefaultDirectRateLimiter, Quota};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Observable limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    pub min_interval: Option<Duration>,
    pub last_request_at: Option<Instant>,
}

/// Request spacing for one upstream source.
pub struct RateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    min_interval: Option<Duration>,
    last_request_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter enforcing `min_interval` between calls; `None` disables spacing.
    pub fn new(min_interval: Option<Duration>) -> Self {
        let limiter = min_interval
            .and_then(Quota::with_period)
            .map(governor::RateLimiter::direct);
        Self {
            limiter,
            min_interval: min_interval.filter(|d| !d.is_zero()),
            last_request_at: Mutex::new(None),
        }
    }

    /// Limiter for a requests-per-second budget.
    pub fn per_second(requests_per_second: f64) -> Self {
        Self::new(interval_for_rate(requests_per_second))
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Wait for the next slot, or bail out if the pipeline is cancelled first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), CancelledError> {
        cancel.check()?;

        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!("Rate limit spacing, waiting {:?}", self.min_interval);
                tokio::select! {
                    _ = limiter.until_ready() => {}
                    _ = cancel.cancelled() => return Err(CancelledError),
                }
            }
        }

        if let Ok(mut last) = self.last_request_at.lock() {
            *last = Some(Instant::now());
        }
        Ok(())
    }

    pub fn state(&self) -> RateLimiterState {
        RateLimiterState {
            min_interval: self.min_interval,
            last_request_at: self.last_request_at.lock().ok().and_then(|last| *last),
        }
    }
}
