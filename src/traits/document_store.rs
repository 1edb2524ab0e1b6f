use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::NfeResult;
use crate::models::types::{BranchCode, InvoiceNumber, RawDocument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPaths {
    pub xml: PathBuf,
    pub pdf: PathBuf,
}

/// Persists the documents of one successfully processed key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(
        &self,
        branch: &BranchCode,
        date: &str,
        invoice_number: &InvoiceNumber,
        xml: &RawDocument,
        pdf: &RawDocument,
    ) -> NfeResult<SavedPaths>;
}
