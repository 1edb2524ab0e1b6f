pub mod browser_fetcher;
pub mod chromium;
pub mod key_source;
pub mod logging;
pub mod meudanfe_api;
pub mod orchestrator;
pub mod settings;
pub mod storage;
pub mod xml_extractor;
