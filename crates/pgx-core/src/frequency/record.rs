//! Canonical population taxonomy and the per-variant frequency record.

use crate::error::PgxError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Canonical population bucket. Every source maps its native labels onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PopulationBucket {
    #[serde(rename = "African")]
    African,
    #[serde(rename = "Asian")]
    Asian,
    #[serde(rename = "Caucasian/European")]
    CaucasianEuropean,
    #[serde(rename = "Hispanic/Latino")]
    HispanicLatino,
    #[serde(rename = "Middle Eastern")]
    MiddleEastern,
    #[serde(rename = "Mixed")]
    Mixed,
}

impl PopulationBucket {
    pub const ALL: [PopulationBucket; 6] = [
        PopulationBucket::African,
        PopulationBucket::Asian,
        PopulationBucket::CaucasianEuropean,
        PopulationBucket::HispanicLatino,
        PopulationBucket::MiddleEastern,
        PopulationBucket::Mixed,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            PopulationBucket::African => "African",
            PopulationBucket::Asian => "Asian",
            PopulationBucket::CaucasianEuropean => "Caucasian/European",
            PopulationBucket::HispanicLatino => "Hispanic/Latino",
            PopulationBucket::MiddleEastern => "Middle Eastern",
            PopulationBucket::Mixed => "Mixed",
        }
    }
}

impl std::fmt::Display for PopulationBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PopulationBucket {
    type Err = PgxError;

    /// Accepts display names and a few common spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let bucket = match normalized.as_str() {
            "african" | "african american" | "black" => PopulationBucket::African,
            "asian" | "east asian" | "south asian" => PopulationBucket::Asian,
            "caucasian/european" | "caucasian" | "european" | "white" => {
                PopulationBucket::CaucasianEuropean
            }
            "hispanic/latino" | "hispanic" | "latino" | "latina" => PopulationBucket::HispanicLatino,
            "middle eastern" => PopulationBucket::MiddleEastern,
            "mixed" | "other" => PopulationBucket::Mixed,
            _ => {
                return Err(PgxError::Config {
                    message: format!("Unknown population: {}", s),
                })
            }
        };
        Ok(bucket)
    }
}

/// Which source the populated buckets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyOrigin {
    #[serde(rename = "Ensembl")]
    Ensembl,
    #[serde(rename = "gnomAD")]
    GnomAd,
    #[serde(rename = "ALFA")]
    Alfa,
    #[serde(rename = "unavailable")]
    Unavailable,
}

impl std::fmt::Display for FrequencyOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrequencyOrigin::Ensembl => "Ensembl",
            FrequencyOrigin::GnomAd => "gnomAD",
            FrequencyOrigin::Alfa => "ALFA",
            FrequencyOrigin::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Allele frequency per canonical bucket, with the source that supplied them.
///
/// Every bucket is always present as a key; `None` means no source reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFrequencyRecord {
    pub frequencies: BTreeMap<PopulationBucket, Option<f64>>,
    pub source: FrequencyOrigin,
}

impl Default for CanonicalFrequencyRecord {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl CanonicalFrequencyRecord {
    /// All buckets absent.
    pub fn unavailable() -> Self {
        Self {
            frequencies: PopulationBucket::ALL.iter().map(|b| (*b, None)).collect(),
            source: FrequencyOrigin::Unavailable,
        }
    }

    pub fn get(&self, bucket: PopulationBucket) -> Option<f64> {
        self.frequencies.get(&bucket).copied().flatten()
    }

    /// Record a frequency, keeping the larger value if the bucket is already set.
    pub fn merge_max(&mut self, bucket: PopulationBucket, frequency: f64) {
        let slot = self.frequencies.entry(bucket).or_insert(None);
        *slot = Some(match *slot {
            Some(existing) => existing.max(frequency),
            None => frequency,
        });
    }

    /// True once at least one bucket holds a value.
    pub fn has_any(&self) -> bool {
        self.frequencies.values().any(Option::is_some)
    }

    pub fn is_unavailable(&self) -> bool {
        self.source == FrequencyOrigin::Unavailable
    }

    /// Populated buckets, highest frequency first.
    pub fn ranked(&self) -> Vec<(PopulationBucket, f64)> {
        let mut filled: Vec<_> = self
            .frequencies
            .iter()
            .filter_map(|(bucket, freq)| freq.map(|f| (*bucket, f)))
            .collect();
        filled.sort_by(|a, b| b.1.total_cmp(&a.1));
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unavailable_has_every_bucket() {
        let record = CanonicalFrequencyRecord::unavailable();
        assert_eq!(record.frequencies.len(), PopulationBucket::ALL.len());
        assert!(!record.has_any());
        assert!(record.is_unavailable());
    }

    #[test]
    fn test_merge_keeps_maximum() {
        let mut record = CanonicalFrequencyRecord::unavailable();
        record.merge_max(PopulationBucket::CaucasianEuropean, 0.05);
        record.merge_max(PopulationBucket::CaucasianEuropean, 0.07);
        record.merge_max(PopulationBucket::CaucasianEuropean, 0.06);
        assert_eq!(record.get(PopulationBucket::CaucasianEuropean), Some(0.07));
        assert_eq!(record.get(PopulationBucket::Asian), None);
    }

    #[test]
    fn test_serializes_with_display_names() {
        let mut record = CanonicalFrequencyRecord::unavailable();
        record.merge_max(PopulationBucket::HispanicLatino, 0.2);
        record.source = FrequencyOrigin::GnomAd;

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source"], json!("gnomAD"));
        assert_eq!(value["frequencies"]["Hispanic/Latino"], json!(0.2));
        assert_eq!(value["frequencies"]["Middle Eastern"], json!(null));

        let back: CanonicalFrequencyRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_ranked_orders_descending() {
        let mut record = CanonicalFrequencyRecord::unavailable();
        record.merge_max(PopulationBucket::African, 0.1);
        record.merge_max(PopulationBucket::Asian, 0.4);
        record.merge_max(PopulationBucket::Mixed, 0.2);

        let ranked: Vec<_> = record.ranked().into_iter().map(|(b, _)| b).collect();
        assert_eq!(
            ranked,
            vec![PopulationBucket::Asian, PopulationBucket::Mixed, PopulationBucket::African]
        );
    }

    #[test]
    fn test_bucket_from_str() {
        assert_eq!(
            "European".parse::<PopulationBucket>().unwrap(),
            PopulationBucket::CaucasianEuropean
        );
        assert_eq!(
            "hispanic/latino".parse::<PopulationBucket>().unwrap(),
            PopulationBucket::HispanicLatino
        );
        assert_eq!(
            "middle_eastern".parse::<PopulationBucket>().unwrap(),
            PopulationBucket::MiddleEastern
        );
        assert!("martian".parse::<PopulationBucket>().is_err());
    }
}
