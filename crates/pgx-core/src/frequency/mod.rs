//! Population allele frequencies.
//!
//! Heterogeneous upstream population labels are normalized into a fixed
//! canonical taxonomy ([`PopulationBucket`]) and resolved across an ordered
//! list of sources by [`PopulationFrequencyResolver`].

mod record;
mod resolver;
mod sources;
mod summary;

pub use record::{CanonicalFrequencyRecord, FrequencyOrigin, PopulationBucket};
pub use resolver::PopulationFrequencyResolver;
pub use sources::{
    alfa_bucket, ensembl_bucket, gnomad_bucket, AlfaSource, EnsemblSource, FrequencySource,
    MyVariantSource, NativeFrequency, SourceResponse,
};
pub use summary::{summarize_population_context, FrequencyClass};
