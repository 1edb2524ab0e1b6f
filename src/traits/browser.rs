use std::path::Path;

use async_trait::async_trait;

use crate::error::NfeResult;

/// Starts browser sessions whose downloads land in a given directory.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, download_dir: &Path) -> NfeResult<Box<dyn BrowserSession>>;
}

/// Primitive page operations used by the download fallback.
///
/// The `try_*` methods make a single attempt and return `Ok(false)` when the
/// element is not on the page yet; waiting is the caller's job.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> NfeResult<()>;

    async fn try_type_by_placeholder(&mut self, placeholder: &str, text: &str) -> NfeResult<bool>;

    async fn try_click_by_label(&mut self, label: &str) -> NfeResult<bool>;

    async fn current_url(&mut self) -> NfeResult<Option<String>>;

    /// Releases the browser process. Called exactly once per session.
    async fn close(self: Box<Self>) -> NfeResult<()>;
}
