use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{NfeError, NfeResult};
use crate::services::settings::{ApiConfig, BrowserConfig};
use crate::traits::browser::{BrowserLauncher, BrowserSession};

const CHROME_ARGS: [&str; 5] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--no-first-run",
    "--window-size=1366,900",
];

/// Elements a human would click to trigger an action on the vendor page.
const CLICKABLE: &str = "button, a, [role=button], input[type=submit], input[type=button]";

/// Launches a local Chrome/Chromium through the DevTools protocol.
#[derive(Builder, Debug, Clone)]
pub struct ChromiumLauncher {
    #[builder(default = true)]
    headless: bool,
    request_timeout: Duration,
    user_agent: Option<String>,
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn from_config(browser: &BrowserConfig, api: &ApiConfig) -> Self {
        Self::builder()
            .headless(browser.headless)
            .request_timeout(api.request_timeout())
            .user_agent(api.user_agent.clone())
            .maybe_executable(browser.chrome_executable.clone())
            .build()
    }

    fn chrome_config(&self) -> NfeResult<ChromeConfig> {
        let mut builder = ChromeConfig::builder()
            .request_timeout(self.request_timeout)
            .args(CHROME_ARGS);
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(ua) = &self.user_agent {
            builder = builder.arg(format!("--user-agent={}", ua));
        }
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder.build().map_err(NfeError::Browser)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, download_dir: &Path) -> NfeResult<Box<dyn BrowserSession>> {
        let config = self.chrome_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| NfeError::Browser(format!("launch: {}", e)))?;
        let handler_task = tokio::spawn(async move {
            // undecodable CDP messages are reported per message; the pump must keep running
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "chromium: handler event error");
                }
            }
        });
        let mut session = ChromiumSession {
            browser,
            handler_task,
            page: None,
            exit_timeout: self.request_timeout,
        };
        if let Err(e) = session.configure(download_dir).await {
            session.shutdown().await;
            return Err(e);
        }
        debug!(dir = %download_dir.display(), headless = self.headless, "chromium: session ready");
        Ok(Box::new(session))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
    /// Bound for each shutdown step
    exit_timeout: Duration,
}

impl ChromiumSession {
    async fn configure(&mut self, download_dir: &Path) -> NfeResult<()> {
        // Chrome resolves download paths against its own cwd, not ours
        let dir = std::path::absolute(download_dir)?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(NfeError::Browser)?;
        self.browser
            .execute(params)
            .await
            .map_err(|e| NfeError::Browser(format!("download behavior: {}", e)))?;
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| NfeError::Browser(format!("new page: {}", e)))?;
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> NfeResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| NfeError::Browser("no page open".to_string()))
    }

    async fn shutdown(&mut self) -> Option<NfeError> {
        let budget = self.exit_timeout;
        if let Some(page) = self.page.take() {
            match timeout(budget, page.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "chromium: page close failed"),
                Err(_) => debug!("chromium: page close timed out"),
            }
        }

        let failure = match timeout(budget, self.browser.close()).await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(NfeError::Browser(format!("close: {}", e))),
            Err(_) => Some(NfeError::Browser(format!("close: no answer within {:?}", budget))),
        };
        // a failed close leaves Chrome running, so waiting on it alone would never return
        if failure.is_some() {
            if let Some(Err(e)) = self.browser.kill().await {
                warn!(error = %e, "chromium: killing browser process failed");
            }
        }
        match timeout(budget, self.browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "chromium: waiting for browser exit failed"),
            Err(_) => warn!(budget = ?budget, "chromium: browser did not exit in time"),
        }
        self.handler_task.abort();
        failure
    }
}

fn placeholder_selector(placeholder: &str) -> String {
    format!(
        "input[placeholder*=\"{}\"]",
        placeholder.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

fn click_by_label_script(label: &str) -> NfeResult<String> {
    let label = serde_json::to_string(label).map_err(|e| NfeError::Browser(e.to_string()))?;
    let clickable = serde_json::to_string(CLICKABLE).map_err(|e| NfeError::Browser(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
  const label = {label};
  const el = Array.from(document.querySelectorAll({clickable}))
    .find(e => ((e.innerText || e.value || '').trim()).includes(label));
  if (!el) return false;
  el.scrollIntoView({{block: 'center'}});
  el.click();
  return true;
}})()"#
    ))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> NfeResult<()> {
        self.page()?
            .goto(url)
            .await
            .map_err(|e| NfeError::Browser(format!("goto {}: {}", url, e)))?;
        Ok(())
    }

    async fn try_type_by_placeholder(&mut self, placeholder: &str, text: &str) -> NfeResult<bool> {
        let page = self.page()?;
        let element = match page.find_element(placeholder_selector(placeholder)).await {
            Ok(el) => el,
            Err(e) => {
                debug!(error = %e, %placeholder, "chromium: input not found yet");
                return Ok(false);
            }
        };
        element
            .click()
            .await
            .map_err(|e| NfeError::Browser(format!("focus input: {}", e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| NfeError::Browser(format!("type into input: {}", e)))?;
        Ok(true)
    }

    async fn try_click_by_label(&mut self, label: &str) -> NfeResult<bool> {
        let script = click_by_label_script(label)?;
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| NfeError::Browser(format!("click {}: {}", label, e)))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn current_url(&mut self) -> NfeResult<Option<String>> {
        self.page()?
            .url()
            .await
            .map_err(|e| NfeError::Browser(format!("url: {}", e)))
    }

    async fn close(mut self: Box<Self>) -> NfeResult<()> {
        match self.shutdown().await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the child process; only the event pump is ours
        self.handler_task.abort();
    }
}
