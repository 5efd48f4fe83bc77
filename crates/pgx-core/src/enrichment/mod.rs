//! Variant enrichment.
//!
//! An [`EnrichmentOrchestrator`] runs [`Enricher`]s in order over one
//! [`EnrichedRecord`]. Each enricher queries a single upstream family:
//! - [`ClinVarEnricher`]: clinical significance and review stars
//! - [`PharmGkbEnricher`]: variant record, clinical annotations, drugs
//! - [`PopulationFrequencyEnricher`]: canonical population frequencies

mod clinvar;
mod enricher;
mod orchestrator;
mod pharmgkb;
mod population;
mod record;

pub use clinvar::{star_rating, summarize_clinvar, ClinVarEnricher};
pub use enricher::Enricher;
pub use orchestrator::{EnrichmentOrchestrator, EnrichmentReport, StepReport, StepStatus};
pub use pharmgkb::{extract_drugs, extract_phenotypes, PharmGkbEnricher};
pub use population::PopulationFrequencyEnricher;
pub use record::{is_empty_value, EnrichedRecord};
