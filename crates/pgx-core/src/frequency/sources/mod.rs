//! Population-frequency sources.
//!
//! A source reports frequencies under its own population labels. The resolver
//! maps each label through the source's fixed table and merges the results.

mod alfa;
mod ensembl;
mod myvariant;

pub use alfa::{alfa_bucket, AlfaSource};
pub use ensembl::{ensembl_bucket, EnsemblSource};
pub use myvariant::MyVariantSource;

use super::record::{FrequencyOrigin, PopulationBucket};
use crate::error::FetchErrorKind;
use crate::network::FetchOutcome;
use async_trait::async_trait;
use serde_json::Value;

/// One frequency under a source's native population label.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFrequency {
    pub label: String,
    pub frequency: f64,
}

impl NativeFrequency {
    pub fn new(label: impl Into<String>, frequency: f64) -> Self {
        Self {
            label: label.into(),
            frequency,
        }
    }
}

/// What a source said about one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResponse {
    /// The source knows the variant; observations may still be empty.
    Observed(Vec<NativeFrequency>),
    /// The source definitively has no record.
    NoRecord,
    /// The source could not be asked.
    Failed(FetchErrorKind),
    Cancelled,
}

impl SourceResponse {
    /// Translate a client outcome, parsing the payload with `parse`.
    pub fn from_outcome(outcome: FetchOutcome, parse: impl FnOnce(&Value) -> Vec<NativeFrequency>) -> Self {
        match outcome {
            FetchOutcome::Found(payload) => SourceResponse::Observed(parse(&payload)),
            FetchOutcome::NotFound => SourceResponse::NoRecord,
            FetchOutcome::Failed(kind) => SourceResponse::Failed(kind),
            FetchOutcome::Cancelled => SourceResponse::Cancelled,
        }
    }
}

#[async_trait]
pub trait FrequencySource: Send + Sync {
    /// Origin recorded when this source fills a bucket.
    fn origin(&self) -> FrequencyOrigin;

    /// Canonical bucket for a native label; `None` for labels outside the table.
    fn bucket_for(&self, label: &str) -> Option<PopulationBucket>;

    async fn lookup(&self, rsid: &str) -> SourceResponse;
}

/// gnomAD ancestry codes, shared by every source that republishes gnomAD.
pub fn gnomad_bucket(code: &str) -> Option<PopulationBucket> {
    match code.to_ascii_lowercase().as_str() {
        "afr" => Some(PopulationBucket::African),
        "amr" => Some(PopulationBucket::HispanicLatino),
        // Ashkenazi Jewish and Finnish share the closest canonical bucket
        "asj" | "nfe" | "fin" => Some(PopulationBucket::CaucasianEuropean),
        "eas" | "sas" => Some(PopulationBucket::Asian),
        "mid" => Some(PopulationBucket::MiddleEastern),
        "oth" => Some(PopulationBucket::Mixed),
        _ => None,
    }
}

/// Read a frequency that may be a number or a per-allele array; arrays take the maximum.
pub(crate) fn frequency_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_f64)
            .fold(None, |acc: Option<f64>, f| Some(acc.map_or(f, |a| a.max(f)))),
        _ => None,
    }
}

/// Numeric part of an rsID (`rs1065852` becomes `1065852`).
pub(crate) fn rs_number(rsid: &str) -> Option<&str> {
    let digits = rsid
        .strip_prefix("rs")
        .or_else(|| rsid.strip_prefix("RS"))?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}
