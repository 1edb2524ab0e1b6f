use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::types::FetchStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub browser: BrowserConfig,
    pub pdf: PdfConfig,
    pub paths: PathsConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub xml_url_base: String, // key is appended: {xml_url_base}{key}
    pub danfe_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub origin: Option<String>,
    pub referer: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            xml_url_base: "https://ws.meudanfe.com/api/v1/get/nfe/xml/".to_string(),
            danfe_url: "https://ws.meudanfe.com/api/v1/get/nfe/xmltodanfepdf/API".to_string(),
            request_timeout_secs: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36".to_string(),
            origin: Some("https://www.meudanfe.com.br".to_string()),
            referer: Some("https://www.meudanfe.com.br/".to_string()),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub headless: bool,
    pub search_url: String,
    pub key_placeholder: String,     // matched against the input's placeholder attribute
    pub search_button_label: String, // visible button text
    pub results_url_marker: String,
    pub download_label: String,
    pub unverified_file_label: Option<String>,
    pub download_dir: PathBuf,
    pub download_extension: String,
    pub settle_delay_ms: u64,
    pub optional_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            search_url: "https://www.meudanfe.com.br".to_string(),
            key_placeholder: "CHAVE DE ACESSO".to_string(),
            search_button_label: "Buscar".to_string(),
            results_url_marker: "ver-danfe".to_string(),
            download_label: "Baixar XML".to_string(),
            unverified_file_label: Some("Manter".to_string()),
            download_dir: PathBuf::from("./tmp/downloads"),
            download_extension: "xml".to_string(),
            settle_delay_ms: 5000,
            optional_wait_secs: 5,
            poll_interval_ms: 250,
            chrome_executable: None,
        }
    }
}

impl BrowserConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn optional_wait(&self) -> Duration {
        Duration::from_secs(self.optional_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PdfConfig {
    /// Reject non-2xx, empty or non-`%PDF` responses from the DANFE endpoint
    pub validate: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { validate: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("CHAVES NOTAS"),
            output_dir: PathBuf::from("NOTAS E XML"),
            log_dir: PathBuf::from("LOGS"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(transparent)]
pub struct StrategyConfig(pub Vec<FetchStrategy>);

impl Default for StrategyConfig {
    fn default() -> Self {
        Self(vec![FetchStrategy::Direct, FetchStrategy::Browser])
    }
}

impl AppConfig {
    /// Strategy chain after dropping the browser when it is disabled and removing repeats.
    pub fn effective_strategies(&self) -> Vec<FetchStrategy> {
        let mut out: Vec<FetchStrategy> = Vec::new();
        for s in &self.strategy.0 {
            if *s == FetchStrategy::Browser && !self.browser.enabled {
                continue;
            }
            if !out.contains(s) {
                out.push(*s);
            }
        }
        out
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    let content = fs::read_to_string(path)?;
    let cfg: AppConfig = serde_yaml::from_str(&content)?;
    if cfg.effective_strategies().is_empty() {
        return Err("strategy list is empty (or only contains a disabled browser)".into());
    }
    Ok(cfg)
}
