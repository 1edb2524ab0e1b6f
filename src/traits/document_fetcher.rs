use async_trait::async_trait;

use crate::error::NfeResult;
use crate::models::types::{AccessKey, FetchStrategy, RawDocument};

/// A way of obtaining the NF-e XML for an access key.
///
/// Implementations are tried in order by the orchestrator; an error for which
/// `NfeError::is_recoverable` holds lets the next one run.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    fn strategy(&self) -> FetchStrategy;

    async fn fetch_xml(&self, key: &AccessKey) -> NfeResult<RawDocument>;
}
