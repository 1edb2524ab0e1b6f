#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nfe_fetcher::error::{NfeError, NfeResult};
use nfe_fetcher::services::browser_fetcher::BrowserFetcher;
use nfe_fetcher::services::meudanfe_api::MeuDanfeApi;
use nfe_fetcher::services::orchestrator::Orchestrator;
use nfe_fetcher::services::settings::BrowserConfig;
use nfe_fetcher::traits::browser::{BrowserLauncher, BrowserSession};
use nfe_fetcher::traits::document_fetcher::DocumentFetcher;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_A: &str = "35240112345678000199550010000001231000001234";
pub const KEY_B: &str = "35240112345678000199550010000004561000004567";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%mock danfe\n";

pub const XML_PATH: &str = "/api/v1/get/nfe/xml/";
pub const DANFE_PATH: &str = "/api/v1/get/nfe/xmltodanfepdf/API";

pub fn nfe_xml(n_nf: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{KEY_A}" versao="4.00">
      <ide><cUF>35</cUF><nNF>{n_nf}</nNF></ide>
    </infNFe>
  </NFe>
</nfeProc>"#
    )
}

/// Working tree of one run: input keys, output documents, logs and browser scratch.
pub struct Workspace {
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.path().join("CHAVES NOTAS")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.path().join("NOTAS E XML")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.path().join("LOGS")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.path().join("downloads")
    }

    pub fn write_keys(&self, file_name: &str, lines: &[&str]) {
        std::fs::create_dir_all(self.input_dir()).unwrap();
        std::fs::write(self.input_dir().join(file_name), lines.join("\n")).unwrap();
    }

    /// Every file below the output directory, relative to it, sorted.
    pub fn output_files(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_files(&self.output_dir(), &self.output_dir(), &mut out);
        out.sort();
        out
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.is_dir() {
            collect_files(base, &p, out);
        } else {
            out.push(p.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/"));
        }
    }
}

pub fn render_config(server_uri: &str, ws: &Workspace, strategy: &str, validate_pdf: bool) -> NamedTempFile {
    let yaml = format!(
        r#"api:
  xml_url_base: "{server_uri}{XML_PATH}"
  danfe_url: "{server_uri}{DANFE_PATH}"
  request_timeout_secs: 5
browser:
  enabled: false
  download_dir: "{downloads}"
pdf:
  validate: {validate_pdf}
paths:
  input_dir: "{input}"
  output_dir: "{output}"
  log_dir: "{logs}"
strategy: [{strategy}]
"#,
        downloads = ws.download_dir().display(),
        input = ws.input_dir().display(),
        output = ws.output_dir().display(),
        logs = ws.log_dir().display(),
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

pub async fn mount_xml(server: &MockServer, key: &str, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(format!("{XML_PATH}{key}")))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_danfe(server: &MockServer, status: u16, body: &[u8]) {
    Mock::given(method("POST"))
        .and(path(DANFE_PATH))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(body.to_vec()),
        )
        .mount(server)
        .await;
}

pub fn api(server_uri: &str, validate_pdf: bool) -> Arc<MeuDanfeApi> {
    split_api(server_uri, server_uri, validate_pdf)
}

/// XML and DANFE endpoints on different hosts, so the XML side can fail at the socket.
pub fn split_api(xml_uri: &str, danfe_uri: &str, validate_pdf: bool) -> Arc<MeuDanfeApi> {
    let api = MeuDanfeApi::builder()
        .xml_url_base(&format!("{xml_uri}{XML_PATH}"))
        .danfe_url(&format!("{danfe_uri}{DANFE_PATH}"))
        .timeout(Duration::from_secs(5))
        .validate_pdf(validate_pdf)
        .build()
        .unwrap();
    Arc::new(api)
}

/// Direct API first, then a browser fallback driven by `launcher`.
pub fn hybrid_orchestrator(server_uri: &str, ws: &Workspace, launcher: ScriptedLauncher) -> Orchestrator {
    hybrid_orchestrator_split(server_uri, server_uri, ws, launcher)
}

pub fn hybrid_orchestrator_split(
    xml_uri: &str,
    danfe_uri: &str,
    ws: &Workspace,
    launcher: ScriptedLauncher,
) -> Orchestrator {
    let api = split_api(xml_uri, danfe_uri, true);
    let settings = BrowserConfig {
        download_dir: ws.download_dir(),
        settle_delay_ms: 0,
        optional_wait_secs: 0,
        poll_interval_ms: 5,
        ..BrowserConfig::default()
    };
    let browser = BrowserFetcher::builder()
        .launcher(Arc::new(launcher))
        .settings(settings)
        .step_timeout(Duration::from_millis(200))
        .build();
    let fetchers = vec![
        api.clone() as Arc<dyn DocumentFetcher>,
        Arc::new(browser) as Arc<dyn DocumentFetcher>,
    ];
    Orchestrator::builder()
        .fetchers(fetchers)
        .danfe(api)
        .build()
        .unwrap()
}

/// Base URI of a local port nothing listens on.
pub fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Stand-in for the vendor page. Knows the default labels of `BrowserConfig`.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    pub has_input: bool,
    /// Written into the download dir when the download control is clicked
    pub download: Option<String>,
    pub launches: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, download_dir: &Path) -> NfeResult<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            dir: download_dir.to_path_buf(),
            page: self.clone(),
            url: None,
            typed: false,
        }))
    }
}

pub struct ScriptedSession {
    dir: PathBuf,
    page: ScriptedLauncher,
    url: Option<String>,
    typed: bool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&mut self, url: &str) -> NfeResult<()> {
        self.url = Some(url.to_string());
        Ok(())
    }

    async fn try_type_by_placeholder(&mut self, _placeholder: &str, _text: &str) -> NfeResult<bool> {
        self.typed = self.page.has_input;
        Ok(self.typed)
    }

    async fn try_click_by_label(&mut self, label: &str) -> NfeResult<bool> {
        match label {
            "Buscar" if self.typed => {
                self.url = Some("https://www.meudanfe.com.br/ver-danfe".to_string());
                Ok(true)
            }
            "Baixar XML" => match &self.page.download {
                Some(body) => {
                    std::fs::write(self.dir.join(format!("NFe{KEY_A}.xml")), body)
                        .map_err(|e| NfeError::Browser(e.to_string()))?;
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    async fn current_url(&mut self) -> NfeResult<Option<String>> {
        Ok(self.url.clone())
    }

    async fn close(self: Box<Self>) -> NfeResult<()> {
        Ok(())
    }
}
