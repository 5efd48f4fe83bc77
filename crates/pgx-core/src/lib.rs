//! PGx Core - Resilient data acquisition for pharmacogenomic variant enrichment.
//!
//! This crate fetches variant annotations from public genomics services
//! (ClinVar, PharmGKB, Ensembl, MyVariant.info, NCBI ALFA) behind one
//! rate-limited, retrying, two-tier cached client. On top of it sit a
//! population-frequency resolver that falls back across sources, and an
//! orchestrator that runs enrichers without letting an empty result erase
//! data a record already carries.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgx_core::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> pgx_core::Result<()> {
//!     let pipeline = Pipeline::builder("/var/cache/pgx")
//!         .ncbi_email("lab@example.org")
//!         .gene("CYP2D6")
//!         .build()?;
//!
//!     let records = pipeline.enrich_rsids(&["rs1065852".into()]).await?;
//!     println!("{}", serde_json::to_string_pretty(&records)?);
//!
//!     let freq = pipeline.resolver().resolve("rs1065852").await;
//!     println!("frequency source: {}", freq.source);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod frequency;
pub mod network;
pub mod pipeline;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheHit, CacheStats, CacheStore, JsonFileStore, SqliteStore};
pub use cancel::{CancellationToken, CancelledError};
pub use config::SourceConfig;
pub use enrichment::{EnrichedRecord, Enricher, EnrichmentOrchestrator, EnrichmentReport};
pub use error::{FetchErrorKind, PgxError, Result};
pub use frequency::{
    CanonicalFrequencyRecord, FrequencyOrigin, PopulationBucket, PopulationFrequencyResolver,
};
pub use network::{FetchOptions, FetchOutcome, ResilientClient, RetryPolicy};
pub use pipeline::{DurableBackend, Pipeline, PipelineBuilder};
