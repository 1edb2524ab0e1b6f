pub mod browser;
pub mod danfe_generator;
pub mod document_fetcher;
pub mod document_store;
