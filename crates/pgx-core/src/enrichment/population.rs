//! Canonical population frequencies for the record's rsID.

use super::enricher::Enricher;
use super::record::EnrichedRecord;
use crate::error::{PgxError, Result};
use crate::frequency::{
    summarize_population_context, CanonicalFrequencyRecord, FrequencyClass, PopulationBucket,
    PopulationFrequencyResolver,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

const FIELDS: &[&str] = &["population_frequencies"];

fn significance(record: &CanonicalFrequencyRecord) -> Value {
    let classes: Map<String, Value> = record
        .frequencies
        .iter()
        .filter_map(|(bucket, freq)| {
            FrequencyClass::classify(*freq)
                .map(|class| (bucket.to_string(), Value::from(class.as_str())))
        })
        .collect();
    Value::Object(classes)
}

/// Writes `population_frequencies`; leaves the record alone when no source has data.
pub struct PopulationFrequencyEnricher {
    resolver: Arc<PopulationFrequencyResolver>,
    patient_population: Option<PopulationBucket>,
}

impl PopulationFrequencyEnricher {
    pub fn new(resolver: Arc<PopulationFrequencyResolver>) -> Self {
        Self {
            resolver,
            patient_population: None,
        }
    }

    /// Highlight this bucket in the summary line.
    pub fn with_patient_population(mut self, bucket: PopulationBucket) -> Self {
        self.patient_population = Some(bucket);
        self
    }
}

#[async_trait]
impl Enricher for PopulationFrequencyEnricher {
    fn name(&self) -> &str {
        "population_frequencies"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
        let Some(rsid) = record.rsid().map(str::to_string) else {
            return Ok(());
        };

        let frequencies = match self.resolver.try_resolve(&rsid).await {
            Ok(frequencies) => frequencies,
            Err(PgxError::UpstreamUnavailable { .. }) => {
                debug!("No population frequencies for {}", rsid);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut value = serde_json::to_value(&frequencies)?;
        if let Value::Object(map) = &mut value {
            map.insert("significance".into(), significance(&frequencies));
            map.insert(
                "summary".into(),
                json!(summarize_population_context(&frequencies, self.patient_population)),
            );
        }
        record.set("population_frequencies", value);
        Ok(())
    }
}
