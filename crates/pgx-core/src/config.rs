//! Centralized configuration for the pgx acquisition core.
//!
//! Loading configuration files or secrets is the caller's business. This module
//! only holds the constants the core falls back to and the resolved per-source
//! settings handed in by the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "pgx-enrich/0.3";
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
    pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(5);
}

/// Cache-related configuration.
pub struct CacheSettings;

impl CacheSettings {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
    pub const POPULATION_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
    pub const MEMORY_CAPACITY: u64 = 10_000;
    pub const RESPONSE_NAMESPACE: &'static str = "responses";
    pub const POPULATION_NAMESPACE: &'static str = "popfreq";
    pub const DATABASE_FILENAME: &'static str = "cache.sqlite";
}

/// Resolved settings for one upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Logical source name, used for logging and error context.
    pub name: String,
    /// Base address; endpoints are joined onto it.
    pub base_url: String,
    /// Maximum request rate. `None` disables spacing entirely.
    pub requests_per_second: Option<f64>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            requests_per_second: None,
        }
    }

    pub fn with_rate(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = Some(requests_per_second);
        self
    }

    /// NCBI E-utilities for ClinVar. NCBI allows 10 rps with an API key, 3 without.
    pub fn clinvar(has_api_key: bool) -> Self {
        let rate = if has_api_key { 10.0 } else { 3.0 };
        Self::new("clinvar", "https://eutils.ncbi.nlm.nih.gov/entrez/eutils").with_rate(rate)
    }

    pub fn pharmgkb() -> Self {
        Self::new("pharmgkb", "https://api.pharmgkb.org/v1/data").with_rate(1.5)
    }

    pub fn ensembl() -> Self {
        Self::new("ensembl", "https://rest.ensembl.org").with_rate(15.0)
    }

    pub fn myvariant() -> Self {
        Self::new("myvariant", "https://myvariant.info/v1").with_rate(10.0)
    }

    pub fn ncbi_variation() -> Self {
        Self::new("ncbi_variation", "https://api.ncbi.nlm.nih.gov/variation/v0").with_rate(3.0)
    }

    /// Minimum spacing between two network calls, if rate limiting is enabled.
    ///
    /// A rate too small for the interval to fit in a `Duration` disables spacing.
    pub fn min_interval(&self) -> Option<Duration> {
        let rps = self.requests_per_second?;
        let interval = interval_for_rate(rps);
        if interval.is_none() && rps > 0.0 {
            warn!("Ignoring unusable rate for {}: {} requests/s", self.name, rps);
        }
        interval
    }
}

/// Spacing for a requests-per-second budget; `None` for zero, negative,
/// non-finite or out-of-range rates.
pub fn interval_for_rate(requests_per_second: f64) -> Option<Duration> {
    if requests_per_second > 0.0 && requests_per_second.is_finite() {
        Duration::try_from_secs_f64(1.0 / requests_per_second).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_interval() {
        let cfg = SourceConfig::new("x", "http://localhost").with_rate(4.0);
        assert_eq!(cfg.min_interval(), Some(Duration::from_millis(250)));

        assert_eq!(SourceConfig::new("x", "http://localhost").min_interval(), None);
        assert_eq!(
            SourceConfig::new("x", "http://localhost").with_rate(0.0).min_interval(),
            None
        );
    }

    #[test]
    fn test_min_interval_tiny_rate_does_not_overflow() {
        let cfg: SourceConfig = serde_json::from_str(
            r#"{"name": "x", "base_url": "http://localhost", "requests_per_second": 1e-30}"#,
        )
        .unwrap();
        assert_eq!(cfg.min_interval(), None);
        assert_eq!(interval_for_rate(f64::MIN_POSITIVE), None);
        assert_eq!(interval_for_rate(f64::NAN), None);
        assert_eq!(interval_for_rate(2.0), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_clinvar_rate_depends_on_key() {
        assert_eq!(SourceConfig::clinvar(true).requests_per_second, Some(10.0));
        assert_eq!(SourceConfig::clinvar(false).requests_per_second, Some(3.0));
    }

    #[test]
    fn test_source_config_deserializes() {
        let cfg: SourceConfig = serde_json::from_str(
            r#"{"name": "ensembl", "base_url": "https://rest.ensembl.org", "requests_per_second": 15.0}"#,
        )
        .unwrap();
        assert_eq!(cfg, SourceConfig::ensembl());
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::REQUEST_TIMEOUT >= Duration::from_secs(15));
        assert!(NetworkConfig::REQUEST_TIMEOUT <= Duration::from_secs(30));
        assert!(CacheSettings::DEFAULT_TTL > Duration::ZERO);
    }
}
