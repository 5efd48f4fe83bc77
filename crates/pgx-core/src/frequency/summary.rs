//! Frequency classification and short human-readable summaries.

use super::record::{CanonicalFrequencyRecord, PopulationBucket};
use serde::{Deserialize, Serialize};

/// Coarse allele-frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyClass {
    VeryRare,
    Rare,
    ModeratelyCommon,
    Common,
}

impl FrequencyClass {
    pub fn classify(frequency: Option<f64>) -> Option<Self> {
        let f = frequency?;
        Some(if f < 0.01 {
            FrequencyClass::VeryRare
        } else if f < 0.05 {
            FrequencyClass::Rare
        } else if f < 0.20 {
            FrequencyClass::ModeratelyCommon
        } else {
            FrequencyClass::Common
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyClass::VeryRare => "very_rare",
            FrequencyClass::Rare => "rare",
            FrequencyClass::ModeratelyCommon => "moderately_common",
            FrequencyClass::Common => "common",
        }
    }
}

fn percent(frequency: f64) -> String {
    format!("{:.1}%", frequency * 100.0)
}

/// Summarize a record for a patient in `patient` (if known).
///
/// Produces e.g. `"In Asian: 41.0%; Across populations: Asian 41.0%, African 12.5%"`.
pub fn summarize_population_context(
    record: &CanonicalFrequencyRecord,
    patient: Option<PopulationBucket>,
) -> String {
    let mut parts = Vec::new();

    if let Some(bucket) = patient {
        if let Some(f) = record.get(bucket) {
            parts.push(format!("In {}: {}", bucket, percent(f)));
        }
    }

    let top: Vec<String> = record
        .ranked()
        .into_iter()
        .take(2)
        .map(|(bucket, f)| format!("{} {}", bucket, percent(f)))
        .collect();
    if !top.is_empty() {
        parts.push(format!("Across populations: {}", top.join(", ")));
    }

    if parts.is_empty() {
        "Population frequency data unavailable".to_string()
    } else {
        parts.join("; ")
    }
}
