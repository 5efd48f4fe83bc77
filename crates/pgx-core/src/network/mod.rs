//! Network access to upstream annotation services.
//!
//! This module provides:
//! - A transport seam with a reqwest implementation
//! - Per-source rate limiting
//! - Retry logic with exponential backoff
//! - The resilient client that composes those with the response cache

mod client;
mod rate_limit;
mod retry;
mod transport;

pub use client::{classify_status, FetchOptions, FetchOutcome, ResilientClient};
pub use rate_limit::{RateLimiter, RateLimiterState};
pub use retry::{retry_async, RetryError, RetryPolicy, RetryStats};
pub use transport::{HttpRequest, RawResponse, ReqwestTransport, Transport, TransportError};
