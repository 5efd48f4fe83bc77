//! Ensembl variation REST (1000 Genomes phase 3 and gnomAD populations).

use super::{gnomad_bucket, FrequencySource, NativeFrequency, SourceResponse};
use crate::frequency::record::{FrequencyOrigin, PopulationBucket};
use crate::network::{FetchOptions, ResilientClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Map an Ensembl population label to a canonical bucket.
///
/// Handles `1000GENOMES:phase_3:<SUPERPOP>` and gnomAD labels in both the
/// `gnomAD:AFR` and `gnomADg:afr` / `gnomADe:afr` spellings.
pub fn ensembl_bucket(label: &str) -> Option<PopulationBucket> {
    if let Some(code) = label.strip_prefix("1000GENOMES:phase_3:") {
        return match code {
            "AFR" => Some(PopulationBucket::African),
            "EAS" | "SAS" => Some(PopulationBucket::Asian),
            "EUR" => Some(PopulationBucket::CaucasianEuropean),
            "AMR" => Some(PopulationBucket::HispanicLatino),
            _ => None,
        };
    }

    let (dataset, code) = label.split_once(':')?;
    if dataset.to_ascii_lowercase().starts_with("gnomad") {
        gnomad_bucket(code)
    } else {
        None
    }
}

/// Extract minor-allele frequencies from a variation payload.
///
/// Ensembl lists one entry per allele per population; when the payload names
/// a minor allele only that allele's entries are kept.
pub fn parse_ensembl(payload: &Value) -> Vec<NativeFrequency> {
    let minor_allele = payload.get("minor_allele").and_then(Value::as_str);
    let Some(populations) = payload.get("populations").and_then(Value::as_array) else {
        return Vec::new();
    };

    populations
        .iter()
        .filter_map(|pop| {
            let label = pop
                .get("population")
                .or_else(|| pop.get("name"))
                .and_then(Value::as_str)?;
            let frequency = pop.get("frequency").and_then(Value::as_f64)?;
            if let (Some(minor), Some(allele)) =
                (minor_allele, pop.get("allele").and_then(Value::as_str))
            {
                if allele != minor {
                    return None;
                }
            }
            Some(NativeFrequency::new(label, frequency))
        })
        .collect()
}

/// Primary frequency source.
pub struct EnsemblSource {
    client: Arc<ResilientClient>,
}

impl EnsemblSource {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FrequencySource for EnsemblSource {
    fn origin(&self) -> FrequencyOrigin {
        FrequencyOrigin::Ensembl
    }

    fn bucket_for(&self, label: &str) -> Option<PopulationBucket> {
        ensembl_bucket(label)
    }

    async fn lookup(&self, rsid: &str) -> SourceResponse {
        let options = FetchOptions::new().with_header("Content-Type", "application/json");
        let outcome = self
            .client
            .fetch(
                &format!("variation/homo_sapiens/{}", rsid),
                &[("pops", "1")],
                &options,
            )
            .await;
        SourceResponse::from_outcome(outcome, parse_ensembl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensembl_labels() {
        assert_eq!(
            ensembl_bucket("1000GENOMES:phase_3:EUR"),
            Some(PopulationBucket::CaucasianEuropean)
        );
        assert_eq!(
            ensembl_bucket("1000GENOMES:phase_3:SAS"),
            Some(PopulationBucket::Asian)
        );
        assert_eq!(ensembl_bucket("gnomAD:OTH"), Some(PopulationBucket::Mixed));
        assert_eq!(ensembl_bucket("gnomADg:afr"), Some(PopulationBucket::African));
        assert_eq!(ensembl_bucket("1000GENOMES:phase_3:ALL"), None);
        assert_eq!(ensembl_bucket("1000GENOMES:phase_3:GBR"), None);
        assert_eq!(ensembl_bucket("TOPMED"), None);
    }

    #[test]
    fn test_parse_keeps_minor_allele_only() {
        let payload = json!({
            "name": "rs1065852",
            "minor_allele": "A",
            "populations": [
                {"population": "1000GENOMES:phase_3:EUR", "allele": "A", "frequency": 0.2},
                {"population": "1000GENOMES:phase_3:EUR", "allele": "G", "frequency": 0.8},
                {"population": "1000GENOMES:phase_3:EAS", "allele": "A", "frequency": 0.57}
            ]
        });

        let parsed = parse_ensembl(&payload);
        assert_eq!(
            parsed,
            vec![
                NativeFrequency::new("1000GENOMES:phase_3:EUR", 0.2),
                NativeFrequency::new("1000GENOMES:phase_3:EAS", 0.57),
            ]
        );
    }

    #[test]
    fn test_parse_legacy_name_key_without_minor_allele() {
        let payload = json!({
            "populations": [
                {"name": "gnomAD:NFE", "frequency": 0.05},
                {"name": "gnomAD:FIN"},
                {"frequency": 0.3}
            ]
        });
        assert_eq!(
            parse_ensembl(&payload),
            vec![NativeFrequency::new("gnomAD:NFE", 0.05)]
        );
    }

    #[test]
    fn test_parse_without_populations() {
        assert!(parse_ensembl(&json!({"name": "rs1"})).is_empty());
        assert!(parse_ensembl(&json!({})).is_empty());
    }
}
