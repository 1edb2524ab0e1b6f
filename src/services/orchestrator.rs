use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bon::bon;
use futures_util::FutureExt;
use tracing::{error, info, warn};

use crate::error::{NfeError, NfeResult};
use crate::models::types::{AccessKey, FailureReason, FetchResult, FetchStrategy, RawDocument};
use crate::services::browser_fetcher::BrowserFetcher;
use crate::services::chromium::ChromiumLauncher;
use crate::services::meudanfe_api::MeuDanfeApi;
use crate::services::settings::AppConfig;
use crate::services::xml_extractor::extract_invoice_number;
use crate::traits::danfe_generator::DanfeGenerator;
use crate::traits::document_fetcher::DocumentFetcher;

/// Turns one access key into `(xml, pdf, nNF)` or a typed failure.
///
/// Fetchers are tried in order, each at most once. The chain only advances when
/// the previous fetcher failed with a recoverable error.
pub struct Orchestrator {
    fetchers: Vec<Arc<dyn DocumentFetcher>>,
    danfe: Arc<dyn DanfeGenerator>,
}

#[bon]
impl Orchestrator {
    #[builder]
    pub fn new(fetchers: Vec<Arc<dyn DocumentFetcher>>, danfe: Arc<dyn DanfeGenerator>) -> NfeResult<Self> {
        if fetchers.is_empty() {
            return Err(NfeError::Config("at least one fetch strategy is required".to_string()));
        }
        Ok(Self { fetchers, danfe })
    }

    /// Wires the meudanfe client and, when configured, the browser fallback.
    pub fn from_config(cfg: &AppConfig) -> NfeResult<Self> {
        let api = Arc::new(MeuDanfeApi::from_config(&cfg.api, cfg.pdf.validate)?);
        let mut fetchers: Vec<Arc<dyn DocumentFetcher>> = Vec::new();
        for strategy in cfg.effective_strategies() {
            match strategy {
                FetchStrategy::Direct => fetchers.push(api.clone()),
                FetchStrategy::Browser => {
                    let launcher = ChromiumLauncher::from_config(&cfg.browser, &cfg.api);
                    let browser = BrowserFetcher::builder()
                        .launcher(Arc::new(launcher))
                        .settings(cfg.browser.clone())
                        .step_timeout(cfg.api.request_timeout())
                        .build();
                    fetchers.push(Arc::new(browser));
                }
            }
        }
        Self::builder().fetchers(fetchers).danfe(api).build()
    }

    pub fn strategies(&self) -> Vec<FetchStrategy> {
        self.fetchers.iter().map(|f| f.strategy()).collect()
    }

    /// Never panics and never returns partial data.
    pub async fn process_key(&self, key: &AccessKey) -> FetchResult {
        match AssertUnwindSafe(self.process(key)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(key = %key.short(), panic = %message, "orchestrator: unexpected failure");
                FetchResult::Failure(FailureReason::Unexpected(message))
            }
        }
    }

    async fn process(&self, key: &AccessKey) -> FetchResult {
        let xml = match self.fetch_xml(key).await {
            Ok(xml) => xml,
            Err(e) => {
                error!(key = %key.short(), error = %e, "orchestrator: could not obtain xml");
                return FetchResult::Failure(FailureReason::NoXml(e));
            }
        };

        let invoice_number = match extract_invoice_number(xml.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                error!(key = %key.short(), error = %e, "orchestrator: invoice number not found");
                return FetchResult::Failure(FailureReason::NoInvoiceNumber(e));
            }
        };
        info!(key = %key.short(), nnf = %invoice_number, "orchestrator: invoice number resolved");

        match self.danfe.generate_pdf(&xml).await {
            Ok(pdf) => FetchResult::Success {
                xml,
                pdf,
                invoice_number,
            },
            Err(e) => {
                error!(key = %key.short(), nnf = %invoice_number, error = %e, "orchestrator: danfe generation failed");
                FetchResult::Failure(FailureReason::PdfUnavailable(e))
            }
        }
    }

    async fn fetch_xml(&self, key: &AccessKey) -> NfeResult<RawDocument> {
        let mut last_error = None;
        for fetcher in &self.fetchers {
            let strategy = fetcher.strategy();
            match fetcher.fetch_xml(key).await {
                Ok(xml) => {
                    info!(key = %key.short(), %strategy, size = xml.len(), "orchestrator: xml obtained");
                    return Ok(xml);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(key = %key.short(), %strategy, error = %e, "orchestrator: strategy failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| NfeError::Unexpected("no fetch strategy ran".to_string())))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
