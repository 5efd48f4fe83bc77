//! Multi-source frequency resolution.
//!
//! Sources are consulted in order. A later source is only asked while every
//! canonical bucket is still empty, so one populated bucket from the primary
//! is final even if other buckets stay absent.

use super::record::CanonicalFrequencyRecord;
use super::sources::{rs_number, FrequencySource, SourceResponse};
use crate::cache::CacheStore;
use crate::cancel::CancellationToken;
use crate::config::CacheSettings;
use crate::error::{PgxError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves canonical population frequencies for rsIDs.
pub struct PopulationFrequencyResolver {
    sources: Vec<Arc<dyn FrequencySource>>,
    cache: Arc<CacheStore>,
    ttl: Duration,
    cancel: CancellationToken,
}

impl PopulationFrequencyResolver {
    /// `sources` is the precedence order: primary first.
    pub fn new(cache: Arc<CacheStore>, sources: Vec<Arc<dyn FrequencySource>>) -> Self {
        Self {
            sources,
            cache,
            ttl: CacheSettings::POPULATION_TTL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resolve frequencies, reporting any shortfall as an `Unavailable` record.
    pub async fn resolve(&self, identifier: &str) -> CanonicalFrequencyRecord {
        self.resolve_inner(identifier)
            .await
            .unwrap_or_else(|_| CanonicalFrequencyRecord::unavailable())
    }

    /// Like [`resolve`](Self::resolve), but an `Unavailable` result is an error.
    pub async fn try_resolve(&self, identifier: &str) -> Result<CanonicalFrequencyRecord> {
        let record = self.resolve_inner(identifier).await?;
        if record.is_unavailable() {
            return Err(PgxError::UpstreamUnavailable {
                identifier: identifier.to_string(),
            });
        }
        Ok(record)
    }

    async fn resolve_inner(&self, identifier: &str) -> Result<CanonicalFrequencyRecord> {
        let rsid = identifier.trim();
        if rs_number(rsid).is_none() {
            debug!("Skipping frequency lookup for non-rsID {:?}", identifier);
            return Ok(CanonicalFrequencyRecord::unavailable());
        }
        let key = rsid.to_ascii_lowercase();

        if let Some(hit) = self
            .cache
            .get(CacheSettings::POPULATION_NAMESPACE, &key, self.ttl)
        {
            match serde_json::from_value::<CanonicalFrequencyRecord>(hit.payload) {
                Ok(record) => {
                    debug!("Population frequencies for {} served from cache", key);
                    return Ok(record);
                }
                Err(e) => warn!("Ignoring unreadable cached frequencies for {}: {}", key, e),
            }
        }

        let mut record = CanonicalFrequencyRecord::unavailable();
        // an Unavailable result is only worth caching if no source failed transiently
        let mut definitive = true;

        for source in &self.sources {
            if record.has_any() {
                break;
            }
            self.cancel.check()?;

            match source.lookup(&key).await {
                SourceResponse::Observed(observations) => {
                    let mut filled = false;
                    for observation in observations {
                        let Some(bucket) = source.bucket_for(&observation.label) else {
                            continue;
                        };
                        let f = observation.frequency;
                        if f.is_finite() && (0.0..=1.0).contains(&f) {
                            record.merge_max(bucket, f);
                            filled = true;
                        }
                    }
                    if filled {
                        record.source = source.origin();
                    } else {
                        debug!("{} has no mappable populations for {}", source.origin(), key);
                    }
                }
                SourceResponse::NoRecord => {
                    debug!("{} has no record for {}", source.origin(), key);
                }
                SourceResponse::Failed(kind) => {
                    definitive = false;
                    warn!("{} lookup for {} failed: {}", source.origin(), key, kind);
                }
                SourceResponse::Cancelled => return Err(PgxError::Cancelled),
            }
        }

        if record.has_any() || definitive {
            match serde_json::to_value(&record) {
                Ok(payload) => {
                    if let Err(e) =
                        self.cache
                            .put(CacheSettings::POPULATION_NAMESPACE, &key, &payload)
                    {
                        warn!("Population frequencies for {} not cached: {}", key, e);
                    }
                }
                Err(e) => warn!("Could not serialize frequencies for {}: {}", key, e),
            }
        }

        info!("Population frequencies for {} resolved from {}", key, record.source);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteStore;
    use crate::error::FetchErrorKind;
    use crate::frequency::record::{FrequencyOrigin, PopulationBucket};
    use crate::frequency::sources::{gnomad_bucket, NativeFrequency};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source returning a fixed response and counting lookups.
    struct FixedSource {
        origin: FrequencyOrigin,
        response: SourceResponse,
        lookups: AtomicUsize,
    }

    impl FixedSource {
        fn new(origin: FrequencyOrigin, response: SourceResponse) -> Arc<Self> {
            Arc::new(Self {
                origin,
                response,
                lookups: AtomicUsize::new(0),
            })
        }

        fn observed(origin: FrequencyOrigin, pairs: &[(&str, f64)]) -> Arc<Self> {
            let observations = pairs
                .iter()
                .map(|(label, f)| NativeFrequency::new(*label, *f))
                .collect();
            Self::new(origin, SourceResponse::Observed(observations))
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FrequencySource for FixedSource {
        fn origin(&self) -> FrequencyOrigin {
            self.origin
        }

        fn bucket_for(&self, label: &str) -> Option<PopulationBucket> {
            gnomad_bucket(label)
        }

        async fn lookup(&self, _rsid: &str) -> SourceResponse {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn test_cache() -> Arc<CacheStore> {
        Arc::new(CacheStore::new(Arc::new(SqliteStore::in_memory().unwrap())))
    }

    fn resolver(cache: Arc<CacheStore>, sources: Vec<Arc<FixedSource>>) -> PopulationFrequencyResolver {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn FrequencySource>)
            .collect();
        PopulationFrequencyResolver::new(cache, sources)
    }

    #[tokio::test]
    async fn test_partial_primary_is_final() {
        let primary = FixedSource::observed(FrequencyOrigin::Ensembl, &[("eas", 0.41)]);
        let secondary = FixedSource::observed(FrequencyOrigin::GnomAd, &[("nfe", 0.2)]);
        let resolver = resolver(test_cache(), vec![primary.clone(), secondary.clone()]);

        let record = resolver.resolve("rs1065852").await;
        assert_eq!(record.source, FrequencyOrigin::Ensembl);
        assert_eq!(record.get(PopulationBucket::Asian), Some(0.41));
        assert_eq!(record.get(PopulationBucket::CaucasianEuropean), None);
        assert_eq!(secondary.lookups(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back_and_takes_maximum() {
        let primary = FixedSource::observed(FrequencyOrigin::Ensembl, &[("unknown_label", 0.3)]);
        let secondary =
            FixedSource::observed(FrequencyOrigin::GnomAd, &[("nfe", 0.05), ("fin", 0.07)]);
        let tertiary = FixedSource::observed(FrequencyOrigin::Alfa, &[("afr", 0.1)]);
        let resolver = resolver(
            test_cache(),
            vec![primary.clone(), secondary.clone(), tertiary.clone()],
        );

        let record = resolver.resolve("rs4244285").await;
        assert_eq!(record.source, FrequencyOrigin::GnomAd);
        assert_eq!(record.get(PopulationBucket::CaucasianEuropean), Some(0.07));
        assert_eq!(primary.lookups(), 1);
        assert_eq!(secondary.lookups(), 1);
        assert_eq!(tertiary.lookups(), 0);
    }

    #[tokio::test]
    async fn test_failed_sources_fall_through_to_tertiary() {
        let primary = FixedSource::new(
            FrequencyOrigin::Ensembl,
            SourceResponse::Failed(FetchErrorKind::TransientNetworkError),
        );
        let secondary = FixedSource::new(FrequencyOrigin::GnomAd, SourceResponse::NoRecord);
        let tertiary = FixedSource::observed(FrequencyOrigin::Alfa, &[("amr", 0.12)]);
        let resolver = resolver(test_cache(), vec![primary, secondary, tertiary]);

        let record = resolver.resolve("rs3892097").await;
        assert_eq!(record.source, FrequencyOrigin::Alfa);
        assert_eq!(record.get(PopulationBucket::HispanicLatino), Some(0.12));
    }

    #[tokio::test]
    async fn test_out_of_range_frequencies_are_ignored() {
        let primary = FixedSource::observed(
            FrequencyOrigin::Ensembl,
            &[("afr", 1.5), ("eas", -0.1), ("nfe", f64::NAN)],
        );
        let resolver = resolver(test_cache(), vec![primary]);

        let record = resolver.resolve("rs1").await;
        assert!(record.is_unavailable());
        assert!(!record.has_any());
    }

    #[tokio::test]
    async fn test_resolved_record_is_cached() {
        let cache = test_cache();
        let primary = FixedSource::observed(FrequencyOrigin::Ensembl, &[("afr", 0.3)]);
        let resolver = resolver(cache.clone(), vec![primary.clone()]);

        let first = resolver.resolve("rs28371725").await;
        let second = resolver.resolve("RS28371725").await;
        assert_eq!(first, second);
        assert_eq!(primary.lookups(), 1);
        assert!(cache
            .get(CacheSettings::POPULATION_NAMESPACE, "rs28371725", CacheSettings::POPULATION_TTL)
            .is_some());
    }

    #[tokio::test]
    async fn test_unavailable_cached_only_when_definitive() {
        let cache = test_cache();
        let flaky = FixedSource::new(
            FrequencyOrigin::Ensembl,
            SourceResponse::Failed(FetchErrorKind::RateLimited),
        );
        let resolver_flaky = resolver(cache.clone(), vec![flaky.clone()]);
        assert!(resolver_flaky.resolve("rs5").await.is_unavailable());
        assert!(resolver_flaky.resolve("rs5").await.is_unavailable());
        assert_eq!(flaky.lookups(), 2);

        let absent = FixedSource::new(FrequencyOrigin::Ensembl, SourceResponse::NoRecord);
        let resolver_absent = resolver(cache, vec![absent.clone()]);
        assert!(resolver_absent.resolve("rs6").await.is_unavailable());
        assert!(resolver_absent.resolve("rs6").await.is_unavailable());
        assert_eq!(absent.lookups(), 1);
    }

    #[tokio::test]
    async fn test_non_rsid_is_not_queried() {
        let cache = test_cache();
        let primary = FixedSource::observed(FrequencyOrigin::Ensembl, &[("afr", 0.3)]);
        let resolver = resolver(cache.clone(), vec![primary.clone()]);

        assert!(resolver.resolve("CYP2D6*4").await.is_unavailable());
        assert_eq!(primary.lookups(), 0);
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_try_resolve_reports_unavailable() {
        let absent = FixedSource::new(FrequencyOrigin::Ensembl, SourceResponse::NoRecord);
        let resolver = resolver(test_cache(), vec![absent]);

        let err = resolver.try_resolve("rs7").await.unwrap_err();
        assert!(matches!(err, PgxError::UpstreamUnavailable { identifier } if identifier == "rs7"));
    }

    #[tokio::test]
    async fn test_cancelled_resolution() {
        let token = CancellationToken::new();
        token.cancel();
        let primary = FixedSource::observed(FrequencyOrigin::Ensembl, &[("afr", 0.3)]);
        let resolver = resolver(test_cache(), vec![primary.clone()]).with_cancellation(token);

        assert!(matches!(resolver.try_resolve("rs8").await, Err(PgxError::Cancelled)));
        assert_eq!(primary.lookups(), 0);
    }
}
