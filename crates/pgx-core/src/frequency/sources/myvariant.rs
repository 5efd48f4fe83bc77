//! gnomAD genome frequencies via MyVariant.info.

use super::{frequency_value, gnomad_bucket, FrequencySource, NativeFrequency, SourceResponse};
use crate::frequency::record::{FrequencyOrigin, PopulationBucket};
use crate::network::{FetchOptions, ResilientClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const FIELDS: &str = "gnomad_genome.af";

/// Extract `af_<code>` frequencies from the first hit of a query response.
///
/// Labels are the raw field names (`af_nfe`); the overall `af` and sex-split
/// fields are skipped later because they have no bucket.
pub fn parse_myvariant(payload: &Value) -> Vec<NativeFrequency> {
    let hit = match payload.get("hits") {
        Some(Value::Array(hits)) => hits.first(),
        // single-document responses carry the fields at the top level
        _ => Some(payload),
    };
    let Some(af) = hit
        .and_then(|h| h.get("gnomad_genome"))
        .and_then(|g| g.get("af"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    af.iter()
        .filter(|(label, _)| label.starts_with("af_"))
        .filter_map(|(label, value)| {
            frequency_value(value).map(|f| NativeFrequency::new(label.as_str(), f))
        })
        .collect()
}

/// Secondary frequency source.
pub struct MyVariantSource {
    client: Arc<ResilientClient>,
}

impl MyVariantSource {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FrequencySource for MyVariantSource {
    fn origin(&self) -> FrequencyOrigin {
        FrequencyOrigin::GnomAd
    }

    fn bucket_for(&self, label: &str) -> Option<PopulationBucket> {
        label.strip_prefix("af_").and_then(gnomad_bucket)
    }

    async fn lookup(&self, rsid: &str) -> SourceResponse {
        let query = format!("dbsnp.rsid:{}", rsid);
        let outcome = self
            .client
            .fetch(
                "query",
                &[("q", query.as_str()), ("fields", FIELDS), ("size", "1")],
                &FetchOptions::default(),
            )
            .await;
        SourceResponse::from_outcome(outcome, parse_myvariant)
    }
}
