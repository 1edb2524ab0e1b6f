use async_trait::async_trait;

use crate::error::NfeResult;
use crate::models::types::RawDocument;

/// Converts NF-e XML into its DANFE PDF.
#[async_trait]
pub trait DanfeGenerator: Send + Sync {
    async fn generate_pdf(&self, xml: &RawDocument) -> NfeResult<RawDocument>;
}
