use std::str::FromStr;

use bon::bon;
use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::error::{NfeError, NfeResult};

/// Number of digits in an NF-e access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// How many leading characters of a key are shown in logs.
const SHORT_KEY_CHARS: usize = 10;

/// Chave de acesso: exactly 44 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, AsRef, Into)]
#[as_ref(str)]
pub struct AccessKey(String);

impl AccessKey {
    pub fn parse(raw: &str) -> NfeResult<Self> {
        let candidate = raw.trim();
        if candidate.len() == ACCESS_KEY_LEN && candidate.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(NfeError::MalformedKey(truncate(candidate)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the key followed by `...`, for log lines.
    pub fn short(&self) -> String {
        truncate(&self.0)
    }
}

impl FromStr for AccessKey {
    type Err = NfeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= SHORT_KEY_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(SHORT_KEY_CHARS).collect();
    out.push_str("...");
    out
}

/// Branch office folder name, e.g. `FILIAL 04`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into, Display, AsRef)]
#[from(String, &str)]
#[as_ref(str)]
pub struct BranchCode(String);

#[bon]
impl BranchCode {
    #[builder]
    pub fn new(digits: &str) -> Self {
        Self(format!("FILIAL {:0>2}", digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// nNF value taken from the invoice XML
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into, Display, AsRef)]
#[from(String, &str)]
#[as_ref(str)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque XML or PDF payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, From, Into)]
pub struct RawDocument(Vec<u8>);

impl RawDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the payload starts with the `%PDF` signature (leading whitespace ignored).
    pub fn looks_like_pdf(&self) -> bool {
        let start = self
            .0
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.0.len());
        self.0[start..].starts_with(b"%PDF")
    }
}

impl From<&[u8]> for RawDocument {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for RawDocument {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// One way of obtaining the invoice XML.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, StrumDisplay, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// POST to the meudanfe XML endpoint
    Direct,
    /// Drive the vendor web page in a headless browser
    Browser,
}

/// States of the browser download fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FallbackStage {
    Init,
    SessionStarted,
    Navigated,
    KeySubmitted,
    ResultsLoaded,
    DownloadTriggered,
    FileRead,
    Done,
    Failed,
}

/// Why a key produced no documents.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error("no xml obtained: {0}")]
    NoXml(NfeError),
    #[error("no invoice number in xml: {0}")]
    NoInvoiceNumber(NfeError),
    #[error("danfe generation failed: {0}")]
    PdfUnavailable(NfeError),
    #[error("unexpected: {0}")]
    Unexpected(String),
}

/// Outcome of processing a single key. Never carries partial data.
#[derive(Debug)]
pub enum FetchResult {
    Success {
        xml: RawDocument,
        pdf: RawDocument,
        invoice_number: InvoiceNumber,
    },
    Failure(FailureReason),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}
