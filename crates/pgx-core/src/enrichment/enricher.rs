use super::record::EnrichedRecord;
use crate::error::Result;
use async_trait::async_trait;

/// One enrichment step.
///
/// An enricher declares the fields it may write. The orchestrator only
/// copies those fields back into the shared record, and never lets a step
/// replace a populated field with an empty value.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    /// Fields this step is allowed to write.
    fn fields(&self) -> &[&'static str];

    /// Add what this step knows to `record`.
    ///
    /// An `Err` means the step could not reach its upstream; the orchestrator
    /// logs it and keeps the record as it was before the step.
    async fn enrich(&self, record: &mut EnrichedRecord) -> Result<()>;
}
