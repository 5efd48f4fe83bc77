//! ClinVar clinical significance via NCBI E-utilities.

use super::enricher::Enricher;
use super::record::EnrichedRecord;
use crate::error::Result;
use crate::network::ResilientClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const FIELDS: &[&str] = &["clinvar"];

/// ClinVar review-status star rating (0 to 4).
pub fn star_rating(review_status: &str) -> u8 {
    let status = review_status.to_lowercase();
    // "no assertion criteria provided" must not match the criteria rule below
    if status.contains("no assertion") {
        0
    } else if status.contains("practice guideline") || status.contains("expert panel") {
        4
    } else if status.contains("multiple submitters") && status.contains("no conflict") {
        3
    } else if status.contains("criteria provided") {
        2
    } else {
        1
    }
}

fn phenotypes(summary: &Value) -> Vec<String> {
    let mut names = BTreeSet::new();
    if let Some(traits) = summary.get("trait_set").and_then(Value::as_array) {
        names.extend(
            traits
                .iter()
                .filter_map(|t| t.get("trait_name").and_then(Value::as_str))
                .map(str::to_string),
        );
    }
    if let Some(list) = summary.get("phenotype_list").and_then(Value::as_array) {
        names.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
    }
    names.into_iter().collect()
}

/// Condense an `esummary` document into the fields kept on the record.
pub fn summarize_clinvar(clinvar_id: &str, summary: &Value) -> Value {
    // newer records carry the classification under germline_classification
    let classification = summary
        .get("clinical_significance")
        .filter(|c| c.get("description").is_some())
        .or_else(|| summary.get("germline_classification"))
        .cloned()
        .unwrap_or(Value::Null);
    let text = |key: &str| classification.get(key).and_then(Value::as_str);
    let review_status = text("review_status").unwrap_or_default();

    json!({
        "clinvar_id": clinvar_id,
        "clinical_significance": text("description"),
        "review_status": text("review_status"),
        "last_evaluated": text("last_evaluated"),
        "variation_type": summary.get("obj_type").and_then(Value::as_str),
        "phenotypes": phenotypes(summary),
        "star_rating": star_rating(review_status),
    })
}

/// Writes `clinvar` for records with an rsID.
pub struct ClinVarEnricher {
    client: Arc<ResilientClient>,
    email: Option<String>,
    api_key: Option<String>,
}

impl ClinVarEnricher {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self {
            client,
            email: None,
            api_key: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn params<'a>(&'a self, mut params: Vec<(&'a str, &'a str)>) -> Vec<(&'a str, &'a str)> {
        params.push(("retmode", "json"));
        if let Some(email) = &self.email {
            params.push(("email", email.as_str()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }
        params
    }

    async fn search(&self, rsid: &str) -> Result<Option<String>> {
        let params = self.params(vec![("db", "clinvar"), ("term", rsid)]);
        let source = &self.client.source().name;
        let Some(payload) = self.client.get("esearch.fcgi", &params).await.into_result(source)? else {
            return Ok(None);
        };
        Ok(payload
            .pointer("/esearchresult/idlist/0")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn summary(&self, clinvar_id: &str) -> Result<Option<Value>> {
        let params = self.params(vec![("db", "clinvar"), ("id", clinvar_id)]);
        let source = &self.client.source().name;
        let payload = self
            .client
            .get("esummary.fcgi", &params)
            .await
            .into_result(source)?;
        Ok(payload
            .and_then(|p| p.get("result").and_then(|r| r.get(clinvar_id)).cloned()))
    }
}

#[async_trait]
impl Enricher for ClinVarEnricher {
    fn name(&self) -> &str {
        "clinvar"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
        let Some(rsid) = record.rsid().map(str::to_string) else {
            debug!("No rsID on {}, skipping ClinVar", record.id);
            return Ok(());
        };

        let Some(clinvar_id) = self.search(&rsid).await? else {
            debug!("ClinVar has no record for {}", rsid);
            return Ok(());
        };
        if let Some(summary) = self.summary(&clinvar_id).await? {
            record.set("clinvar", summarize_clinvar(&clinvar_id, &summary));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_rating() {
        assert_eq!(star_rating("practice guideline"), 4);
        assert_eq!(star_rating("reviewed by expert panel"), 4);
        assert_eq!(
            star_rating("criteria provided, multiple submitters, no conflicts"),
            3
        );
        assert_eq!(star_rating("criteria provided, single submitter"), 2);
        assert_eq!(
            star_rating("criteria provided, conflicting classifications"),
            2
        );
        assert_eq!(star_rating("no assertion criteria provided"), 0);
        assert_eq!(star_rating("no assertion provided"), 0);
        assert_eq!(star_rating("flagged submission"), 1);
    }

    #[test]
    fn test_summarize_legacy_layout() {
        let summary = json!({
            "obj_type": "single nucleotide variant",
            "clinical_significance": {
                "description": "drug response",
                "review_status": "reviewed by expert panel",
                "last_evaluated": "2021/03/01 00:00"
            },
            "trait_set": [{"trait_name": "Tamoxifen response"}, {"trait_name": "Codeine response"}],
            "phenotype_list": ["Codeine response"]
        });

        let condensed = summarize_clinvar("16895", &summary);
        assert_eq!(condensed["clinvar_id"], json!("16895"));
        assert_eq!(condensed["clinical_significance"], json!("drug response"));
        assert_eq!(condensed["star_rating"], json!(4));
        assert_eq!(
            condensed["phenotypes"],
            json!(["Codeine response", "Tamoxifen response"])
        );
    }

    #[test]
    fn test_summarize_germline_classification() {
        let summary = json!({
            "clinical_significance": {},
            "germline_classification": {
                "description": "Pathogenic",
                "review_status": "criteria provided, single submitter"
            }
        });

        let condensed = summarize_clinvar("1", &summary);
        assert_eq!(condensed["clinical_significance"], json!("Pathogenic"));
        assert_eq!(condensed["star_rating"], json!(2));
        assert_eq!(condensed["last_evaluated"], json!(null));
        assert_eq!(condensed["phenotypes"], json!([]));
    }
}
