//! PharmGKB variant records and gene-level clinical annotations.

use super::enricher::Enricher;
use super::record::EnrichedRecord;
use crate::error::{PgxError, Result};
use crate::network::ResilientClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const FIELDS: &[&str] = &["pharmgkb"];
const MAX_ANNOTATIONS: usize = 5;
const PHENOTYPE_KEYWORDS: &[&str] = &[
    "metabolizer",
    "metaboliser",
    "function",
    "clearance",
    "response",
    "efficacy",
    "toxicity",
];
const MAX_PHENOTYPE_LEN: usize = 200;

fn data_array(payload: Option<Value>) -> Vec<Value> {
    match payload.and_then(|mut p| p.get_mut("data").map(Value::take)) {
        Some(Value::Array(items)) => items,
        Some(Value::Object(item)) => vec![Value::Object(item)],
        _ => Vec::new(),
    }
}

fn evidence_level(annotation: &Value) -> String {
    match annotation.get("levelOfEvidence") {
        Some(Value::Object(level)) => level
            .get("term")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(level)) => level.clone(),
        _ => String::new(),
    }
}

/// One entry per distinct chemical across `annotations`, in first-seen order.
pub fn extract_drugs(annotations: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut drugs = Vec::new();

    for annotation in annotations {
        let Some(chemicals) = annotation.get("relatedChemicals").and_then(Value::as_array) else {
            continue;
        };
        let recommendation = annotation
            .pointer("/allelePhenotypes/0/phenotype")
            .and_then(Value::as_str)
            .unwrap_or_default();

        for chemical in chemicals {
            let Some(name) = chemical.get("name").and_then(Value::as_str) else {
                continue;
            };
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            drugs.push(json!({
                "name": name,
                "pharmgkb_id": chemical.get("id").and_then(Value::as_str).unwrap_or_default(),
                "recommendation": recommendation,
                "evidence_level": evidence_level(annotation),
                "annotation_types": annotation.get("types").cloned().unwrap_or_else(|| json!([])),
                "annotation_name": annotation.get("name").and_then(Value::as_str).unwrap_or_default(),
                "score": annotation.get("score").cloned().unwrap_or(Value::Null),
            }));
        }
    }
    drugs
}

fn shorten(text: &str) -> String {
    if text.chars().count() <= MAX_PHENOTYPE_LEN {
        return text.to_string();
    }
    match text.split_once(". ") {
        Some((first, _)) => format!("{}.", first),
        None => text.to_string(),
    }
}

/// Metabolizer and drug-response phenotype statements from `annotations`.
pub fn extract_phenotypes(annotations: &[Value]) -> Vec<String> {
    let mut phenotypes = BTreeSet::new();

    for annotation in annotations {
        if let Some(allele_phenotypes) = annotation.get("allelePhenotypes").and_then(Value::as_array) {
            for text in allele_phenotypes
                .iter()
                .filter_map(|p| p.get("phenotype").and_then(Value::as_str))
            {
                let lower = text.to_lowercase();
                if PHENOTYPE_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    phenotypes.insert(shorten(text));
                }
            }
        }

        for field in ["phenotype", "phenotypeCategory"] {
            if let Some(text) = annotation.get(field).and_then(Value::as_str) {
                let lower = text.to_lowercase();
                if PHENOTYPE_KEYWORDS[..3].iter().any(|k| lower.contains(k)) {
                    phenotypes.insert(text.to_string());
                }
            }
        }
    }
    phenotypes.into_iter().collect()
}

/// One failed lookup leaves its half empty instead of discarding the other.
fn partial(lookup: Result<Vec<Value>>, what: &str, record: &EnrichedRecord) -> Vec<Value> {
    lookup.unwrap_or_else(|e| {
        warn!("PharmGKB {} lookup failed for {}: {}", what, record.id, e);
        Vec::new()
    })
}

/// Writes `pharmgkb` with the variant record, top annotations and drugs.
///
/// The gene symbol comes from the record, or from [`with_gene`](Self::with_gene)
/// when the record has none.
pub struct PharmGkbEnricher {
    client: Arc<ResilientClient>,
    gene: Option<String>,
}

impl PharmGkbEnricher {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client, gene: None }
    }

    pub fn with_gene(mut self, gene: impl Into<String>) -> Self {
        self.gene = Some(gene.into());
        self
    }

    async fn variant(&self, rsid: &str) -> Result<Vec<Value>> {
        let payload = self
            .client
            .get("variant", &[("name", rsid)])
            .await
            .into_result(&self.client.source().name)?;
        Ok(data_array(payload))
    }

    async fn gene_annotations(&self, gene: &str) -> Result<Vec<Value>> {
        let payload = self
            .client
            .get("clinicalAnnotation", &[("location.genes.symbol", gene)])
            .await
            .into_result(&self.client.source().name)?;
        Ok(data_array(payload))
    }
}

#[async_trait]
impl Enricher for PharmGkbEnricher {
    fn name(&self) -> &str {
        "pharmgkb"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
        let rsid = record.rsid().map(str::to_string);
        let variant = match &rsid {
            Some(rsid) => self.variant(rsid).await,
            None => Ok(Vec::new()),
        };
        let gene = record
            .gene_symbol()
            .map(str::to_string)
            .or_else(|| self.gene.clone());
        let annotations = match &gene {
            Some(gene) => self.gene_annotations(gene).await,
            None => Ok(Vec::new()),
        };

        let (variant, annotations) = match (variant, annotations) {
            (Err(PgxError::Cancelled), _) | (_, Err(PgxError::Cancelled)) => {
                return Err(PgxError::Cancelled)
            }
            (Err(variant_err), Err(_)) => return Err(variant_err),
            (variant, annotations) => (
                partial(variant, "variant", record),
                partial(annotations, "clinical annotation", record),
            ),
        };

        if variant.is_empty() && annotations.is_empty() {
            debug!("PharmGKB has nothing for {}", record.id);
            return Ok(());
        }

        let drugs = extract_drugs(&annotations);
        let phenotypes = extract_phenotypes(&annotations);
        let top: Vec<Value> = annotations.into_iter().take(MAX_ANNOTATIONS).collect();

        record.set(
            "pharmgkb",
            json!({
                "variant": variant,
                "gene": gene,
                "annotations": top,
                "drugs": drugs,
                "phenotypes": phenotypes,
            }),
        );
        Ok(())
    }
}
