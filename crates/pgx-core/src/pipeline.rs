//! Builder wiring the cache, source clients and enrichers into a pipeline.

use crate::cache::{CacheConfig, CacheStats, CacheStore, DurableStore, JsonFileStore, SqliteStore};
use crate::cancel::CancellationToken;
use crate::config::{CacheSettings, SourceConfig};
use crate::enrichment::{
    ClinVarEnricher, EnrichedRecord, Enricher, EnrichmentOrchestrator, PharmGkbEnricher,
    PopulationFrequencyEnricher,
};
use crate::error::{PgxError, Result};
use crate::frequency::{
    AlfaSource, EnsemblSource, FrequencySource, MyVariantSource, PopulationBucket,
    PopulationFrequencyResolver,
};
use crate::network::{ReqwestTransport, ResilientClient, RetryPolicy, Transport};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Durable tier backing the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurableBackend {
    /// One SQLite database in the cache directory.
    #[default]
    Sqlite,
    /// One JSON file per entry under the cache directory.
    JsonFiles,
}

/// Builder for a configured [`Pipeline`].
///
/// # Example
///
/// ```rust,ignore
/// use pgx_core::Pipeline;
///
/// let pipeline = Pipeline::builder("./cache")
///     .ncbi_email("lab@example.org")
///     .gene("CYP2D6")
///     .build()?;
/// let records = pipeline.enrich_rsids(&["rs1065852".into()]).await?;
/// ```
pub struct PipelineBuilder {
    cache_dir: PathBuf,
    backend: DurableBackend,
    memory_capacity: u64,
    ncbi_api_key: Option<String>,
    ncbi_email: Option<String>,
    gene: Option<String>,
    patient_population: Option<PopulationBucket>,
    retry_policy: RetryPolicy,
    transport: Option<Arc<dyn Transport>>,
    source_overrides: HashMap<String, SourceConfig>,
    cancel: CancellationToken,
}

impl PipelineBuilder {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            backend: DurableBackend::default(),
            memory_capacity: CacheSettings::MEMORY_CAPACITY,
            ncbi_api_key: None,
            ncbi_email: None,
            gene: None,
            patient_population: None,
            retry_policy: RetryPolicy::default(),
            transport: None,
            source_overrides: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn backend(mut self, backend: DurableBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// NCBI API key; also raises the ClinVar rate budget.
    pub fn ncbi_api_key(mut self, key: impl Into<String>) -> Self {
        self.ncbi_api_key = Some(key.into());
        self
    }

    pub fn ncbi_email(mut self, email: impl Into<String>) -> Self {
        self.ncbi_email = Some(email.into());
        self
    }

    /// Gene used for PharmGKB annotations when a record names none.
    pub fn gene(mut self, gene: impl Into<String>) -> Self {
        self.gene = Some(gene.into());
        self
    }

    pub fn patient_population(mut self, bucket: PopulationBucket) -> Self {
        self.patient_population = Some(bucket);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Share a transport instead of building a reqwest one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the built-in settings for the source with the same name
    /// (`clinvar`, `pharmgkb`, `ensembl`, `myvariant`, `ncbi_variation`).
    pub fn source(mut self, config: SourceConfig) -> Self {
        self.source_overrides.insert(config.name.clone(), config);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn source_config(&self, default: SourceConfig) -> SourceConfig {
        self.source_overrides
            .get(&default.name)
            .cloned()
            .unwrap_or(default)
    }

    fn open_durable(&self) -> Result<Arc<dyn DurableStore>> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| PgxError::Io {
            message: format!("Failed to create cache directory: {}", self.cache_dir.display()),
            path: Some(self.cache_dir.clone()),
            source: Some(e),
        })?;

        let store: Arc<dyn DurableStore> = match self.backend {
            DurableBackend::Sqlite => Arc::new(SqliteStore::open(
                self.cache_dir.join(CacheSettings::DATABASE_FILENAME),
            )?),
            DurableBackend::JsonFiles => Arc::new(JsonFileStore::open(&self.cache_dir)?),
        };
        Ok(store)
    }

    /// Open the cache and build every client. Only setup failures are errors.
    pub fn build(self) -> Result<Pipeline> {
        let durable = self.open_durable()?;
        let cache = Arc::new(CacheStore::with_config(
            durable,
            CacheConfig::default().with_memory_capacity(self.memory_capacity),
        ));
        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new()?),
        };

        let client = |default: SourceConfig| {
            Arc::new(
                ResilientClient::with_transport(
                    self.source_config(default),
                    cache.clone(),
                    transport.clone(),
                )
                .with_retry_policy(self.retry_policy.clone())
                .with_cancellation(self.cancel.clone()),
            )
        };

        let mut clinvar =
            ClinVarEnricher::new(client(SourceConfig::clinvar(self.ncbi_api_key.is_some())));
        if let Some(email) = &self.ncbi_email {
            clinvar = clinvar.with_email(email.clone());
        }
        if let Some(key) = &self.ncbi_api_key {
            clinvar = clinvar.with_api_key(key.clone());
        }

        let mut pharmgkb = PharmGkbEnricher::new(client(SourceConfig::pharmgkb()));
        if let Some(gene) = &self.gene {
            pharmgkb = pharmgkb.with_gene(gene.clone());
        }

        let sources: Vec<Arc<dyn FrequencySource>> = vec![
            Arc::new(EnsemblSource::new(client(SourceConfig::ensembl()))),
            Arc::new(MyVariantSource::new(client(SourceConfig::myvariant()))),
            Arc::new(AlfaSource::new(client(SourceConfig::ncbi_variation()))),
        ];
        let resolver = Arc::new(
            PopulationFrequencyResolver::new(cache.clone(), sources)
                .with_cancellation(self.cancel.clone()),
        );
        let mut population = PopulationFrequencyEnricher::new(resolver.clone());
        if let Some(bucket) = self.patient_population {
            population = population.with_patient_population(bucket);
        }

        let enrichers: Vec<Arc<dyn Enricher>> =
            vec![Arc::new(clinvar), Arc::new(pharmgkb), Arc::new(population)];
        let orchestrator =
            EnrichmentOrchestrator::new(enrichers).with_cancellation(self.cancel.clone());

        info!(
            "Pipeline ready (cache at {}, enrichers: {})",
            self.cache_dir.display(),
            orchestrator.enricher_names().join(", ")
        );

        Ok(Pipeline {
            cache,
            resolver,
            orchestrator,
            cancel: self.cancel,
        })
    }
}

/// A ready-to-run enrichment pipeline sharing one cache across all sources.
pub struct Pipeline {
    cache: Arc<CacheStore>,
    resolver: Arc<PopulationFrequencyResolver>,
    orchestrator: EnrichmentOrchestrator,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn builder(cache_dir: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder::new(cache_dir)
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn resolver(&self) -> &Arc<PopulationFrequencyResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &EnrichmentOrchestrator {
        &self.orchestrator
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn enrich(&self, record: EnrichedRecord) -> Result<EnrichedRecord> {
        self.orchestrator.enrich(record).await
    }

    /// Enrich bare rsIDs.
    pub async fn enrich_rsids(&self, rsids: &[String]) -> Result<Vec<EnrichedRecord>> {
        let records = rsids.iter().map(EnrichedRecord::new).collect();
        self.orchestrator.enrich_all(records).await
    }
}
