use std::time::Duration;

use async_trait::async_trait;
use bon::bon;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{NfeError, NfeResult};
use crate::models::types::{AccessKey, FetchStrategy, RawDocument};
use crate::services::settings::ApiConfig;
use crate::traits::danfe_generator::DanfeGenerator;
use crate::traits::document_fetcher::DocumentFetcher;

/// Client for the meudanfe web service: XML download by key and XML to DANFE conversion.
pub struct MeuDanfeApi {
    client: Client,
    xml_url_base: Url,
    danfe_url: Url,
    validate_pdf: bool,
}

#[bon]
impl MeuDanfeApi {
    #[builder]
    pub fn new(
        xml_url_base: &str,
        danfe_url: &str,
        timeout: Duration,
        user_agent: Option<String>,
        origin: Option<String>,
        referer: Option<String>,
        #[builder(default = true)] validate_pdf: bool,
    ) -> NfeResult<Self> {
        // join() replaces the last segment unless the base ends with '/'
        let base = if xml_url_base.ends_with('/') {
            xml_url_base.to_string()
        } else {
            format!("{}/", xml_url_base)
        };
        let xml_url_base = Url::parse(&base)
            .map_err(|e| NfeError::Config(format!("api.xml_url_base {}: {}", base, e)))?;
        let danfe_url = Url::parse(danfe_url)
            .map_err(|e| NfeError::Config(format!("api.danfe_url {}: {}", danfe_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        if let Some(v) = origin.as_deref().and_then(|o| HeaderValue::from_str(o).ok()) {
            headers.insert(ORIGIN, v);
        }
        if let Some(v) = referer.as_deref().and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(REFERER, v);
        }

        let mut builder = Client::builder().timeout(timeout).default_headers(headers);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            xml_url_base,
            danfe_url,
            validate_pdf,
        })
    }

    pub fn from_config(api: &ApiConfig, validate_pdf: bool) -> NfeResult<Self> {
        Self::builder()
            .xml_url_base(&api.xml_url_base)
            .danfe_url(&api.danfe_url)
            .timeout(api.request_timeout())
            .user_agent(api.user_agent.clone())
            .maybe_origin(api.origin.clone())
            .maybe_referer(api.referer.clone())
            .validate_pdf(validate_pdf)
            .build()
    }

    fn xml_url(&self, key: &AccessKey) -> NfeResult<Url> {
        self.xml_url_base
            .join(key.as_str())
            .map_err(|e| NfeError::Config(format!("xml url for key: {}", e)))
    }

    /// POSTs the key to the XML endpoint. Any HTTP status is returned as-is;
    /// only transport failures (connect, timeout, body read) are errors.
    pub async fn fetch_xml_direct(&self, key: &AccessKey) -> NfeResult<(u16, RawDocument)> {
        let url = self.xml_url(key)?;
        debug!(%url, key = %key.short(), "api: POST xml");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(key.as_str().as_bytes().to_vec())
            .send()
            .await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        info!(status, size = bytes.len(), key = %key.short(), "api: xml response");
        Ok((status, RawDocument::from(bytes.to_vec())))
    }

    /// POSTs the XML to the conversion endpoint and returns status and body unchecked.
    pub async fn generate_pdf_raw(&self, xml: &RawDocument) -> NfeResult<(u16, RawDocument)> {
        debug!(url = %self.danfe_url, size = xml.len(), "api: POST xml to danfe");
        let response = self
            .client
            .post(self.danfe_url.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(xml.as_bytes().to_vec())
            .send()
            .await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        info!(status, size = bytes.len(), "api: danfe response");
        Ok((status, RawDocument::from(bytes.to_vec())))
    }
}

#[async_trait]
impl DocumentFetcher for MeuDanfeApi {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Direct
    }

    async fn fetch_xml(&self, key: &AccessKey) -> NfeResult<RawDocument> {
        let (status, body) = self.fetch_xml_direct(key).await?;
        if !(200..300).contains(&status) {
            warn!(status, key = %key.short(), "api: xml endpoint refused the request");
            return Err(NfeError::Http { status });
        }
        if body.is_empty() {
            warn!(key = %key.short(), "api: xml endpoint returned an empty body");
            return Err(NfeError::EmptyDocument { source_name: "direct" });
        }
        Ok(body)
    }
}

#[async_trait]
impl DanfeGenerator for MeuDanfeApi {
    async fn generate_pdf(&self, xml: &RawDocument) -> NfeResult<RawDocument> {
        let (status, body) = self.generate_pdf_raw(xml).await?;
        if !self.validate_pdf {
            return Ok(body);
        }
        if !(200..300).contains(&status) {
            return Err(NfeError::InvalidPdf(format!("status {}", status)));
        }
        if body.is_empty() {
            return Err(NfeError::InvalidPdf("empty body".to_string()));
        }
        if !body.looks_like_pdf() {
            return Err(NfeError::InvalidPdf("missing %PDF signature".to_string()));
        }
        Ok(body)
    }
}
