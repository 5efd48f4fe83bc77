//! Resilient upstream client.
//!
//! One client is bound to one [`SourceConfig`]. A fetch goes through:
//! 1. the shared response cache (a fresh hit never touches the network)
//! 2. the source's rate limiter
//! 3. the transport, under the retry policy
//! 4. status classification, then a best-effort cache write on success
//!
//! Expected failure modes come back as a [`FetchOutcome`] rather than `Err`,
//! so callers can tell "nothing there" apart from "could not ask".

use super::rate_limit::{RateLimiter, RateLimiterState};
use super::retry::{retry_async, RetryError, RetryPolicy};
use super::transport::{HttpRequest, RawResponse, ReqwestTransport, Transport};
use crate::cache::{cache_key, CacheStore};
use crate::cancel::CancellationToken;
use crate::config::{CacheSettings, NetworkConfig, SourceConfig};
use crate::error::{FetchErrorKind, PgxError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a single logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Parsed JSON payload, from cache or network.
    Found(Value),
    /// Upstream answered 404. Never cached, never retried.
    NotFound,
    /// Classified failure after retries were exhausted or ruled out.
    Failed(FetchErrorKind),
    /// The pipeline was cancelled while this fetch was waiting.
    Cancelled,
}

impl FetchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found(_))
    }

    /// The payload, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            FetchOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Collapse into a `Result`: 404 becomes `Ok(None)`, failures become errors.
    pub fn into_result(self, source_name: &str) -> Result<Option<Value>> {
        match self {
            FetchOutcome::Found(value) => Ok(Some(value)),
            FetchOutcome::NotFound => Ok(None),
            FetchOutcome::Failed(kind) => Err(PgxError::fetch(
                source_name,
                kind,
                "request did not produce a usable response",
            )),
            FetchOutcome::Cancelled => Err(PgxError::Cancelled),
        }
    }
}

/// Per-call fetch options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Read from and write to the response cache.
    pub use_cache: bool,
    /// Maximum accepted age of a cached response.
    pub ttl: Duration,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            ttl: CacheSettings::DEFAULT_TTL,
            headers: Vec::new(),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Map a non-success HTTP status to a failure kind.
///
/// Returns `None` for 2xx and 404, which are not failures.
pub fn classify_status(status: u16) -> Option<FetchErrorKind> {
    match status {
        200..=299 | 404 => None,
        429 => Some(FetchErrorKind::RateLimited),
        408 | 500..=599 => Some(FetchErrorKind::TransientNetworkError),
        _ => Some(FetchErrorKind::PermanentClientError),
    }
}

/// Parse a success body. An empty body is an empty object.
fn parse_body(body: &str) -> std::result::Result<Value, serde_json::Error> {
    if body.trim().is_empty() {
        Ok(Value::Object(Default::default()))
    } else {
        serde_json::from_str(body)
    }
}

enum Attempt {
    Body(Value),
    NotFound,
}

#[derive(Debug)]
enum AttemptError {
    Upstream { kind: FetchErrorKind, message: String },
    Cancelled,
}

impl AttemptError {
    fn upstream(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        AttemptError::Upstream {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Upstream { kind, message } => write!(f, "{}: {}", kind, message),
            AttemptError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Cached, rate-limited, retrying client for one upstream source.
pub struct ResilientClient {
    source: SourceConfig,
    cache: Arc<CacheStore>,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    cooldown: Duration,
    cancel: CancellationToken,
    network_attempts: AtomicU64,
}

impl ResilientClient {
    /// Client backed by a fresh reqwest transport.
    pub fn new(source: SourceConfig, cache: Arc<CacheStore>) -> Result<Self> {
        Ok(Self::with_transport(
            source,
            cache,
            Arc::new(ReqwestTransport::new()?),
        ))
    }

    /// Client over an existing transport, usually one shared by every source.
    pub fn with_transport(
        source: SourceConfig,
        cache: Arc<CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let limiter = RateLimiter::new(source.min_interval());
        Self {
            source,
            cache,
            transport,
            limiter,
            retry: RetryPolicy::default(),
            cooldown: NetworkConfig::RATE_LIMIT_COOLDOWN,
            cancel: CancellationToken::new(),
            network_attempts: AtomicU64::new(0),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Wait applied after a 429 before the retry policy takes over.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn rate_limiter_state(&self) -> RateLimiterState {
        self.limiter.state()
    }

    /// Number of requests actually handed to the transport.
    pub fn network_attempts(&self) -> u64 {
        self.network_attempts.load(Ordering::Relaxed)
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if url::Url::parse(endpoint).is_ok() {
            return endpoint.to_string();
        }
        let base = self.source.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Fetch with default options.
    pub async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> FetchOutcome {
        self.fetch(endpoint, params, &FetchOptions::default()).await
    }

    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        options: &FetchOptions,
    ) -> FetchOutcome {
        let url = self.resolve_url(endpoint);
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let key = cache_key(&url, &params);

        if options.use_cache {
            if let Some(hit) = self
                .cache
                .get(CacheSettings::RESPONSE_NAMESPACE, &key, options.ttl)
            {
                debug!("{} cache hit ({:?}) for {}", self.source.name, hit.tier, url);
                return FetchOutcome::Found(hit.payload);
            }
        }

        let request = HttpRequest {
            url,
            params,
            headers: options.headers.clone(),
        };

        let (result, stats) = retry_async(
            &self.retry,
            &self.cancel,
            || self.attempt(&request),
            |e: &AttemptError| match e {
                AttemptError::Upstream { kind, .. } => self.retry.is_retryable(*kind),
                AttemptError::Cancelled => false,
            },
        )
        .await;

        match result {
            Ok(Attempt::Body(value)) => {
                if options.use_cache {
                    if let Err(e) =
                        self.cache
                            .put(CacheSettings::RESPONSE_NAMESPACE, &key, &value)
                    {
                        warn!(
                            "{} response for {} not cached: {}",
                            self.source.name, request.url, e
                        );
                    }
                }
                FetchOutcome::Found(value)
            }
            Ok(Attempt::NotFound) => {
                debug!("{} has no record at {}", self.source.name, request.url);
                FetchOutcome::NotFound
            }
            Err(RetryError::Failed(AttemptError::Upstream { kind, message })) => {
                warn!(
                    "{} request to {} failed after {} attempt(s): {} ({})",
                    self.source.name, request.url, stats.attempts, kind, message
                );
                FetchOutcome::Failed(kind)
            }
            Err(RetryError::Failed(AttemptError::Cancelled)) | Err(RetryError::Cancelled) => {
                debug!("{} request to {} cancelled", self.source.name, request.url);
                FetchOutcome::Cancelled
            }
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> std::result::Result<Attempt, AttemptError> {
        self.limiter
            .acquire(&self.cancel)
            .await
            .map_err(|_| AttemptError::Cancelled)?;
        self.network_attempts.fetch_add(1, Ordering::Relaxed);

        let response = self
            .transport
            .get(request)
            .await
            .map_err(|e| AttemptError::upstream(FetchErrorKind::TransientNetworkError, e.to_string()))?;

        match self.interpret(&response) {
            Err(AttemptError::Upstream {
                kind: FetchErrorKind::RateLimited,
                message,
            }) => {
                warn!(
                    "{} rate limited us, cooling down for {:?}",
                    self.source.name, self.cooldown
                );
                self.cancel
                    .sleep(self.cooldown)
                    .await
                    .map_err(|_| AttemptError::Cancelled)?;
                Err(AttemptError::upstream(FetchErrorKind::RateLimited, message))
            }
            other => other,
        }
    }

    fn interpret(&self, response: &RawResponse) -> std::result::Result<Attempt, AttemptError> {
        if response.status == 404 {
            return Ok(Attempt::NotFound);
        }
        if let Some(kind) = classify_status(response.status) {
            return Err(AttemptError::upstream(
                kind,
                format!("HTTP {}", response.status),
            ));
        }
        parse_body(&response.body).map(Attempt::Body).map_err(|e| {
            AttemptError::upstream(
                FetchErrorKind::MalformedResponse,
                format!("invalid JSON body: {}", e),
            )
        })
    }
}
