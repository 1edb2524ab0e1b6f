use thiserror::Error;

use crate::models::types::FallbackStage;

/// Errors raised while fetching, parsing or persisting one NF-e.
#[derive(Debug, Error)]
pub enum NfeError {
    #[error("malformed access key: {0}")]
    MalformedKey(String),

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("empty document received from {source_name}")]
    EmptyDocument { source_name: &'static str },

    #[error("browser automation failed at {stage}: {reason}")]
    Automation { stage: FallbackStage, reason: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("malformed xml: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("nNF field not found in xml")]
    FieldNotFound,

    #[error("danfe endpoint returned an unusable pdf: {0}")]
    InvalidPdf(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl NfeError {
    pub fn automation(stage: FallbackStage, reason: impl Into<String>) -> Self {
        NfeError::Automation {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether the next fetch strategy in the chain may be tried after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NfeError::Http { .. } | NfeError::Network(_) | NfeError::EmptyDocument { .. }
        )
    }
}

pub type NfeResult<T> = Result<T, NfeError>;
