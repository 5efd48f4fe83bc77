//! NCBI ALFA allele counts via the Variation Services frequency endpoint.

use super::{rs_number, FrequencySource, NativeFrequency, SourceResponse};
use crate::frequency::record::{FrequencyOrigin, PopulationBucket};
use crate::network::{FetchOptions, ResilientClient};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// BioProject under which ALFA publishes its counts.
const ALFA_PROJECT: &str = "PRJNA507278";

/// Map an ALFA BioSample id to a canonical bucket.
pub fn alfa_bucket(biosample: &str) -> Option<PopulationBucket> {
    match biosample {
        "SAMN10492695" => Some(PopulationBucket::CaucasianEuropean),
        // African Others, African American, African
        "SAMN10492696" | "SAMN10492698" | "SAMN10492703" => Some(PopulationBucket::African),
        // East Asian, Other Asian, South Asian, Asian
        "SAMN10492697" | "SAMN10492701" | "SAMN10492702" | "SAMN10492704" => {
            Some(PopulationBucket::Asian)
        }
        // Latin American 1 and 2
        "SAMN10492699" | "SAMN10492700" => Some(PopulationBucket::HispanicLatino),
        "SAMN11605645" => Some(PopulationBucket::Mixed),
        _ => None,
    }
}

fn counts_of(value: &Value) -> BTreeMap<String, u64> {
    value
        .as_object()
        .map(|alleles| {
            alleles
                .iter()
                .filter_map(|(allele, count)| count.as_u64().map(|c| (allele.clone(), c)))
                .collect()
        })
        .unwrap_or_default()
}

/// The alternate allele with the most observations across every population.
fn pick_alt_allele(reference: Option<&str>, samples: &Map<String, Value>) -> Option<String> {
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for counts in samples.values() {
        for (allele, count) in counts_of(counts) {
            *totals.entry(allele).or_default() += count;
        }
    }

    match reference {
        Some(reference) => totals
            .into_iter()
            .filter(|(allele, _)| allele != reference)
            .max_by_key(|(_, count)| *count)
            .map(|(allele, _)| allele),
        // without a reference, the globally least common observed allele
        None => totals
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .min_by_key(|(_, count)| *count)
            .map(|(allele, _)| allele),
    }
}

/// Per-BioSample frequency of the alternate allele.
pub fn parse_alfa(payload: &Value) -> Vec<NativeFrequency> {
    let Some(results) = payload.get("results").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut frequencies = Vec::new();
    for interval in results.values() {
        let Some(samples) = interval
            .get("counts")
            .and_then(|c| c.get(ALFA_PROJECT))
            .and_then(|p| p.get("allele_counts"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let reference = interval.get("ref").and_then(Value::as_str);
        let Some(alt) = pick_alt_allele(reference, samples) else {
            continue;
        };

        for (biosample, counts) in samples {
            let counts = counts_of(counts);
            let total: u64 = counts.values().sum();
            if total == 0 {
                continue;
            }
            let alt_count = counts.get(&alt).copied().unwrap_or(0);
            frequencies.push(NativeFrequency::new(
                biosample.as_str(),
                alt_count as f64 / total as f64,
            ));
        }
    }
    frequencies
}

/// Tertiary frequency source.
pub struct AlfaSource {
    client: Arc<ResilientClient>,
}

impl AlfaSource {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FrequencySource for AlfaSource {
    fn origin(&self) -> FrequencyOrigin {
        FrequencyOrigin::Alfa
    }

    fn bucket_for(&self, label: &str) -> Option<PopulationBucket> {
        alfa_bucket(label)
    }

    async fn lookup(&self, rsid: &str) -> SourceResponse {
        let Some(number) = rs_number(rsid) else {
            return SourceResponse::NoRecord;
        };
        let outcome = self
            .client
            .fetch(
                &format!("refsnp/{}/frequency", number),
                &[],
                &FetchOptions::default(),
            )
            .await;
        SourceResponse::from_outcome(outcome, parse_alfa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_alt_allele_frequencies() {
        let payload = json!({
            "build_id": "20201027095038",
            "results": {
                "42130691@1": {
                    "ref": "G",
                    "counts": {"PRJNA507278": {"allele_counts": {
                        "SAMN10492695": {"G": 750, "A": 250},
                        "SAMN10492703": {"G": 90, "A": 10},
                        "SAMN10492705": {"G": 840, "A": 260},
                        "SAMN10492697": {"G": 0, "A": 0}
                    }}}
                }
            }
        });

        let parsed = parse_alfa(&payload);
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains(&NativeFrequency::new("SAMN10492695", 0.25)));
        assert!(parsed.contains(&NativeFrequency::new("SAMN10492703", 0.1)));
        // the total sample is parsed but has no bucket
        assert_eq!(alfa_bucket("SAMN10492705"), None);
    }

    #[test]
    fn test_parse_without_reference_uses_rarest_allele() {
        let payload = json!({"results": {"1@1": {"counts": {"PRJNA507278": {"allele_counts": {
            "SAMN10492699": {"C": 80, "T": 20}
        }}}}}});
        assert_eq!(
            parse_alfa(&payload),
            vec![NativeFrequency::new("SAMN10492699", 0.2)]
        );
    }

    #[test]
    fn test_parse_missing_project() {
        assert!(parse_alfa(&json!({"results": {"1@1": {"counts": {}}}})).is_empty());
        assert!(parse_alfa(&json!({})).is_empty());
    }

    #[test]
    fn test_biosample_buckets() {
        assert_eq!(alfa_bucket("SAMN10492700"), Some(PopulationBucket::HispanicLatino));
        assert_eq!(alfa_bucket("SAMN10492702"), Some(PopulationBucket::Asian));
        assert_eq!(alfa_bucket("SAMN11605645"), Some(PopulationBucket::Mixed));
        assert_eq!(alfa_bucket("SAMN00000000"), None);
    }
}
