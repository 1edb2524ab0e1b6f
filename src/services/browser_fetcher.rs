use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bon::bon;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{NfeError, NfeResult};
use crate::models::types::{AccessKey, FallbackStage, FetchStrategy, RawDocument};
use crate::services::settings::BrowserConfig;
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::traits::document_fetcher::DocumentFetcher;

/// Something to look for on the page, retried until it succeeds or the budget runs out.
#[derive(Debug, Clone, Copy)]
enum UiStep<'a> {
    TypeInto { placeholder: &'a str, text: &'a str },
    Click { label: &'a str },
    UrlContains { marker: &'a str },
}

impl UiStep<'_> {
    async fn attempt(&self, session: &mut dyn BrowserSession) -> NfeResult<bool> {
        match *self {
            UiStep::TypeInto { placeholder, text } => {
                session.try_type_by_placeholder(placeholder, text).await
            }
            UiStep::Click { label } => session.try_click_by_label(label).await,
            UiStep::UrlContains { marker } => Ok(session
                .current_url()
                .await?
                .is_some_and(|u| u.contains(marker))),
        }
    }
}

/// Downloads the XML through the vendor web page when the API refuses to serve it.
///
/// Every run gets a fresh scratch directory and its own browser session, which is
/// closed on every exit path. No step is retried beyond its wait budget.
pub struct BrowserFetcher {
    launcher: Arc<dyn BrowserLauncher>,
    settings: BrowserConfig,
    step_timeout: Duration,
}

#[bon]
impl BrowserFetcher {
    #[builder]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        settings: BrowserConfig,
        step_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            settings,
            step_timeout,
        }
    }

    async fn run(&self, key: &AccessKey) -> NfeResult<RawDocument> {
        info!(key = %key.short(), stage = %FallbackStage::Init, "browser: starting fallback");
        prepare_download_dir(&self.settings.download_dir)
            .await
            .map_err(|e| NfeError::automation(FallbackStage::SessionStarted, format!("scratch dir: {}", e)))?;

        let mut session = self
            .launcher
            .launch(&self.settings.download_dir)
            .await
            .map_err(|e| NfeError::automation(FallbackStage::SessionStarted, e.to_string()))?;
        info!(stage = %FallbackStage::SessionStarted, "browser: session started");

        let result = self.drive(&mut *session, key).await;

        match timeout(self.step_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "browser: session close failed"),
            Err(_) => warn!(budget = ?self.step_timeout, "browser: session close timed out, abandoning it"),
        }
        match &result {
            Ok(doc) => info!(stage = %FallbackStage::Done, size = doc.len(), key = %key.short(), "browser: xml downloaded"),
            Err(e) => warn!(stage = %FallbackStage::Failed, error = %e, key = %key.short(), "browser: fallback failed"),
        }
        result
    }

    async fn drive(&self, session: &mut dyn BrowserSession, key: &AccessKey) -> NfeResult<RawDocument> {
        let s = &self.settings;

        match timeout(self.step_timeout, session.goto(&s.search_url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(NfeError::automation(FallbackStage::Navigated, e.to_string())),
            Err(_) => {
                return Err(NfeError::automation(
                    FallbackStage::Navigated,
                    format!("page load exceeded {:?}", self.step_timeout),
                ));
            }
        }
        info!(stage = %FallbackStage::Navigated, url = %s.search_url, "browser: search page loaded");

        let typed = UiStep::TypeInto {
            placeholder: &s.key_placeholder,
            text: key.as_str(),
        };
        self.require(session, typed, FallbackStage::KeySubmitted, "key input field")
            .await?;
        let search = UiStep::Click {
            label: &s.search_button_label,
        };
        self.require(session, search, FallbackStage::KeySubmitted, "search button")
            .await?;
        info!(stage = %FallbackStage::KeySubmitted, "browser: key submitted");

        let results = UiStep::UrlContains {
            marker: &s.results_url_marker,
        };
        self.require(session, results, FallbackStage::ResultsLoaded, "results page")
            .await?;
        info!(stage = %FallbackStage::ResultsLoaded, "browser: results page loaded");

        if let Some(label) = s.unverified_file_label.as_deref().filter(|l| !l.is_empty()) {
            // absence of the interstitial is normal
            match wait_until(session, UiStep::Click { label }, s.optional_wait(), s.poll_interval()).await {
                Ok(true) => debug!("browser: dismissed unverified file prompt"),
                Ok(false) => debug!("browser: no unverified file prompt"),
                Err(e) => debug!(error = %e, "browser: unverified file check failed"),
            }
        }
        let download = UiStep::Click {
            label: &s.download_label,
        };
        self.require(session, download, FallbackStage::DownloadTriggered, "download control")
            .await?;
        info!(stage = %FallbackStage::DownloadTriggered, "browser: download triggered");

        sleep(s.settle_delay()).await;
        let file = newest_download(&s.download_dir, &s.download_extension)
            .await
            .map_err(|e| NfeError::automation(FallbackStage::FileRead, e.to_string()))?
            .ok_or_else(|| {
                NfeError::automation(
                    FallbackStage::FileRead,
                    format!("no .{} file in {}", s.download_extension, s.download_dir.display()),
                )
            })?;
        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| NfeError::automation(FallbackStage::FileRead, format!("{}: {}", file.display(), e)))?;
        if bytes.is_empty() {
            return Err(NfeError::automation(
                FallbackStage::FileRead,
                format!("{} is empty", file.display()),
            ));
        }
        info!(stage = %FallbackStage::FileRead, path = %file.display(), size = bytes.len(), "browser: download read");
        Ok(RawDocument::from(bytes))
    }

    async fn require(
        &self,
        session: &mut dyn BrowserSession,
        step: UiStep<'_>,
        stage: FallbackStage,
        what: &str,
    ) -> NfeResult<()> {
        let found = wait_until(session, step, self.step_timeout, self.settings.poll_interval())
            .await
            .map_err(|e| NfeError::automation(stage, format!("{}: {}", what, e)))?;
        if found {
            Ok(())
        } else {
            Err(NfeError::automation(
                stage,
                format!("{} not found within {:?}", what, self.step_timeout),
            ))
        }
    }
}

/// Polls `step` until it succeeds or `budget` is spent. A single attempt that
/// hangs is cut off at the deadline too.
async fn wait_until(
    session: &mut dyn BrowserSession,
    step: UiStep<'_>,
    budget: Duration,
    poll: Duration,
) -> NfeResult<bool> {
    let deadline = Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, step.attempt(session)).await {
            Ok(Ok(true)) => return Ok(true),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(false),
        }
        if Instant::now() + poll > deadline {
            return Ok(false);
        }
        sleep(poll).await;
    }
}

/// Removes and recreates the scratch directory so the newest-file lookup only sees this run's download.
pub async fn prepare_download_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

/// Most recently created file in `dir` with the given extension (case-insensitive).
pub async fn newest_download(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !matches_ext {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let stamp = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().is_none_or(|(t, _)| stamp >= *t) {
            best = Some((stamp, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[async_trait]
impl DocumentFetcher for BrowserFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Browser
    }

    async fn fetch_xml(&self, key: &AccessKey) -> NfeResult<RawDocument> {
        self.run(key).await
    }
}
