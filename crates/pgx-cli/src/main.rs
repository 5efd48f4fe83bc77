//! pgx-enrich - Enrich rsIDs with ClinVar, PharmGKB and population frequency data.
//!
//! Records are printed to stdout as a JSON array; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pgx_core::{DurableBackend, Pipeline, PopulationBucket};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Sqlite,
    Json,
}

impl From<Backend> for DurableBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Sqlite => DurableBackend::Sqlite,
            Backend::Json => DurableBackend::JsonFiles,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pgx-enrich")]
#[command(about = "Enrich pharmacogenomic variants from public genomics services")]
struct Args {
    /// rsIDs to enrich
    #[arg(required = true)]
    rsids: Vec<String>,

    /// Cache directory (defaults to the user cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Durable cache backend
    #[arg(long, value_enum, default_value = "sqlite")]
    backend: Backend,

    /// Gene symbol for PharmGKB clinical annotations
    #[arg(long)]
    gene: Option<String>,

    /// Patient population highlighted in the frequency summary
    #[arg(long)]
    population: Option<String>,

    /// NCBI E-utilities API key
    #[arg(long, env = "NCBI_API_KEY")]
    ncbi_api_key: Option<String>,

    /// Contact email sent to NCBI
    #[arg(long, env = "NCBI_EMAIL")]
    ncbi_email: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pgx-enrich")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cache_dir = args.cache_dir.unwrap_or_else(default_cache_dir);
    info!("Cache directory: {}", cache_dir.display());

    let mut builder = Pipeline::builder(&cache_dir).backend(args.backend.into());
    if let Some(gene) = args.gene {
        builder = builder.gene(gene);
    }
    if let Some(population) = args.population {
        let bucket: PopulationBucket = population
            .parse()
            .with_context(|| format!("invalid --population value '{}'", population))?;
        builder = builder.patient_population(bucket);
    }
    if let Some(key) = args.ncbi_api_key {
        builder = builder.ncbi_api_key(key);
    }
    if let Some(email) = args.ncbi_email {
        builder = builder.ncbi_email(email);
    }

    let pipeline = builder.build().context("failed to set up the enrichment pipeline")?;

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding requests");
            token.cancel();
        }
    });

    let records = pipeline.enrich_rsids(&args.rsids).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);

    let stats = pipeline.cache_stats();
    info!(
        "Enriched {} record(s); cache: {} memory hits, {} durable hits, {} misses",
        records.len(),
        stats.memory_hits,
        stats.durable_hits,
        stats.misses
    );

    Ok(())
}
