//! Sequential enrichment with preserve-if-empty merging.
//!
//! Each step runs against a working copy of the record. When it returns,
//! only the fields it declared are merged back, and a declared field that
//! came back empty keeps its previous non-empty value. A failed step leaves
//! the record untouched.

use super::enricher::Enricher;
use super::record::{is_empty_value, EnrichedRecord};
use crate::cancel::CancellationToken;
use crate::error::{PgxError, Result};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepStatus {
    Applied {
        /// Declared fields whose empty output was replaced by the prior value.
        preserved: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub enricher: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Per-record log of what each step did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub steps: Vec<StepReport>,
}

impl EnrichmentReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed { .. }))
    }
}

/// Applies an ordered list of enrichers to records.
pub struct EnrichmentOrchestrator {
    enrichers: Vec<Arc<dyn Enricher>>,
    cancel: CancellationToken,
}

impl EnrichmentOrchestrator {
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        Self {
            enrichers,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn enricher_names(&self) -> Vec<&str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    /// Run every enricher over `record`.
    ///
    /// Enricher failures are absorbed; the only error is [`PgxError::Cancelled`].
    pub async fn enrich(&self, record: EnrichedRecord) -> Result<EnrichedRecord> {
        self.enrich_with_report(record).await.map(|(record, _)| record)
    }

    pub async fn enrich_with_report(
        &self,
        mut record: EnrichedRecord,
    ) -> Result<(EnrichedRecord, EnrichmentReport)> {
        let mut report = EnrichmentReport::default();

        for enricher in &self.enrichers {
            self.cancel.check()?;
            debug!("Running {} on {}", enricher.name(), record.id);

            let mut working = record.clone();
            match enricher.enrich(&mut working).await {
                Ok(()) => {
                    let preserved = merge_declared(&mut record, working, enricher.fields());
                    if !preserved.is_empty() {
                        debug!(
                            "{} returned empty {:?} for {}; kept previous values",
                            enricher.name(),
                            preserved,
                            record.id
                        );
                    }
                    report.steps.push(StepReport {
                        enricher: enricher.name().to_string(),
                        status: StepStatus::Applied { preserved },
                    });
                }
                Err(PgxError::Cancelled) => return Err(PgxError::Cancelled),
                Err(e) => {
                    warn!("{} failed for {}: {}", enricher.name(), record.id, e);
                    report.steps.push(StepReport {
                        enricher: enricher.name().to_string(),
                        status: StepStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        info!(
            "Enriched {} ({} of {} steps applied)",
            record.id,
            report.steps.len() - report.failed_steps().count(),
            self.enrichers.len()
        );
        Ok((record, report))
    }

    /// Enrich several records concurrently. Source clients are shared, so
    /// their rate limiters still serialize the upstream calls.
    pub async fn enrich_all(&self, records: Vec<EnrichedRecord>) -> Result<Vec<EnrichedRecord>> {
        join_all(records.into_iter().map(|record| self.enrich(record)))
            .await
            .into_iter()
            .collect()
    }
}

/// Copy the declared fields of `output` into `record`. Returns the names of
/// fields whose previous non-empty value was kept over an empty output.
fn merge_declared(
    record: &mut EnrichedRecord,
    mut output: EnrichedRecord,
    declared: &[&'static str],
) -> Vec<String> {
    let mut preserved = Vec::new();

    for field in declared {
        let new_value = output.remove(field);
        let new_is_empty = new_value.as_ref().map_or(true, is_empty_value);

        if new_is_empty && !record.is_field_empty(field) {
            preserved.push(field.to_string());
            continue;
        }
        match new_value {
            Some(value) => record.set(*field, value),
            None => {
                record.remove(field);
            }
        }
    }
    preserved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Writes fixed values into its declared fields.
    struct Writer {
        name: &'static str,
        fields: Vec<&'static str>,
        values: Vec<(&'static str, Value)>,
    }

    #[async_trait]
    impl Enricher for Writer {
        fn name(&self) -> &str {
            self.name
        }

        fn fields(&self) -> &[&'static str] {
            &self.fields
        }

        async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
            for (field, value) in &self.values {
                record.set(*field, value.clone());
            }
            Ok(())
        }
    }

    /// Scribbles on its fields, then fails.
    struct Failing;

    #[async_trait]
    impl Enricher for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn fields(&self) -> &[&'static str] {
            &["pharmgkb"]
        }

        async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
            record.set("pharmgkb", json!({"partial": true}));
            Err(PgxError::fetch(
                "pharmgkb",
                FetchErrorKind::TransientNetworkError,
                "retries exhausted",
            ))
        }
    }

    fn writer(name: &'static str, values: Vec<(&'static str, Value)>) -> Arc<dyn Enricher> {
        Arc::new(Writer {
            name,
            fields: values.iter().map(|(f, _)| *f).collect(),
            values,
        })
    }

    #[tokio::test]
    async fn test_populated_field_survives_empty_output() {
        let record = EnrichedRecord::new("rs1065852")
            .with_field("evidences", json!([{"source": "PubMed", "id": "123"}]));
        let orchestrator = EnrichmentOrchestrator::new(vec![
            writer("clinvar", vec![("clinvar", json!({"star_rating": 2})), ("evidences", json!([]))]),
            writer("pharmgkb", vec![("evidences", Value::Null)]),
        ]);

        let (record, report) = orchestrator.enrich_with_report(record).await.unwrap();
        assert_eq!(record.get("evidences"), Some(&json!([{"source": "PubMed", "id": "123"}])));
        assert_eq!(record.get("clinvar"), Some(&json!({"star_rating": 2})));
        assert_eq!(
            report.steps[0].status,
            StepStatus::Applied {
                preserved: vec!["evidences".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_non_empty_output_replaces_previous() {
        let record = EnrichedRecord::new("rs1").with_field("clinvar", json!({"old": true}));
        let orchestrator =
            EnrichmentOrchestrator::new(vec![writer("clinvar", vec![("clinvar", json!({"new": true}))])]);

        let record = orchestrator.enrich(record).await.unwrap();
        assert_eq!(record.get("clinvar"), Some(&json!({"new": true})));
    }

    #[tokio::test]
    async fn test_undeclared_fields_are_discarded() {
        struct Sneaky;

        #[async_trait]
        impl Enricher for Sneaky {
            fn name(&self) -> &str {
                "sneaky"
            }
            fn fields(&self) -> &[&'static str] {
                &["clinvar"]
            }
            async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()> {
                record.set("clinvar", json!({"ok": 1}));
                record.set("gene", json!("OVERWRITTEN"));
                Ok(())
            }
        }

        let record = EnrichedRecord::new("rs1").with_field("gene", json!("CYP2D6"));
        let orchestrator = EnrichmentOrchestrator::new(vec![Arc::new(Sneaky)]);
        let record = orchestrator.enrich(record).await.unwrap();

        assert_eq!(record.get("gene"), Some(&json!("CYP2D6")));
        assert_eq!(record.get("clinvar"), Some(&json!({"ok": 1})));
    }

    #[tokio::test]
    async fn test_failed_enricher_does_not_stop_pipeline() {
        let orchestrator = EnrichmentOrchestrator::new(vec![
            writer("clinvar", vec![("clinvar", json!({"clinvar_id": "17000"}))]),
            Arc::new(Failing),
            writer("population", vec![("population_frequencies", json!({"source": "Ensembl"}))]),
        ]);

        let (record, report) = orchestrator
            .enrich_with_report(EnrichedRecord::new("rs1"))
            .await
            .unwrap();

        assert_eq!(record.get("clinvar"), Some(&json!({"clinvar_id": "17000"})));
        assert_eq!(
            record.get("population_frequencies"),
            Some(&json!({"source": "Ensembl"}))
        );
        assert!(record.get("pharmgkb").is_none());

        let failed: Vec<_> = report.failed_steps().map(|s| s.enricher.as_str()).collect();
        assert_eq!(failed, vec!["failing"]);
    }

    #[tokio::test]
    async fn test_cancelled_pipeline() {
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator =
            EnrichmentOrchestrator::new(vec![writer("clinvar", vec![("clinvar", json!(1))])])
                .with_cancellation(token);

        assert!(matches!(
            orchestrator.enrich(EnrichedRecord::new("rs1")).await,
            Err(PgxError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_enrich_all_keeps_order() {
        let orchestrator =
            EnrichmentOrchestrator::new(vec![writer("tag", vec![("tag", json!("done"))])]);
        let records = vec![EnrichedRecord::new("rs1"), EnrichedRecord::new("rs2")];

        let enriched = orchestrator.enrich_all(records).await.unwrap();
        let ids: Vec<_> = enriched.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rs1", "rs2"]);
        assert!(enriched.iter().all(|r| r.get("tag") == Some(&json!("done"))));
    }

    #[test]
    fn test_report_serializes() {
        let report = EnrichmentReport {
            steps: vec![StepReport {
                enricher: "clinvar".into(),
                status: StepStatus::Failed {
                    error: "boom".into(),
                },
            }],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"steps": [{"enricher": "clinvar", "status": "failed", "error": "boom"}]})
        );
    }
}
