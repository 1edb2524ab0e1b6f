use std::path::PathBuf;

use async_trait::async_trait;
use bon::Builder;
use tracing::{info, warn};

use crate::error::{NfeError, NfeResult};
use crate::models::types::{BranchCode, InvoiceNumber, RawDocument};
use crate::traits::document_store::{DocumentStore, SavedPaths};

const XML_DIR: &str = "XML";
const PDF_DIR: &str = "DANFE";

/// Today's local date as used in the output layout.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Files documents under `<base>/<branch>/<date>/{XML,DANFE}/<nNF>.{xml,pdf}`.
#[derive(Builder, Debug, Clone)]
pub struct FsDocumentStore {
    #[builder(into)]
    base_dir: PathBuf,
}

impl FsDocumentStore {
    fn day_dir(&self, branch: &BranchCode, date: &str) -> PathBuf {
        self.base_dir.join(branch.as_str()).join(date)
    }
}

/// The nNF ends up as a file name, so anything that could escape the directory is refused.
fn file_stem(invoice_number: &InvoiceNumber) -> NfeResult<&str> {
    let stem = invoice_number.as_str().trim();
    let unsafe_char = |c: char| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control();
    if stem.is_empty() || stem == "." || stem == ".." || stem.chars().any(unsafe_char) {
        return Err(NfeError::Unexpected(format!(
            "invoice number {:?} is not usable as a file name",
            invoice_number.as_str()
        )));
    }
    Ok(stem)
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn save(
        &self,
        branch: &BranchCode,
        date: &str,
        invoice_number: &InvoiceNumber,
        xml: &RawDocument,
        pdf: &RawDocument,
    ) -> NfeResult<SavedPaths> {
        if xml.is_empty() {
            return Err(NfeError::EmptyDocument { source_name: "xml" });
        }
        if pdf.is_empty() {
            return Err(NfeError::EmptyDocument { source_name: "pdf" });
        }
        let stem = file_stem(invoice_number)?;

        let day = self.day_dir(branch, date);
        let xml_dir = day.join(XML_DIR);
        let pdf_dir = day.join(PDF_DIR);
        tokio::fs::create_dir_all(&xml_dir).await?;
        tokio::fs::create_dir_all(&pdf_dir).await?;

        let xml_path = xml_dir.join(format!("{}.xml", stem));
        let pdf_path = pdf_dir.join(format!("{}.pdf", stem));

        tokio::fs::write(&xml_path, xml.as_bytes()).await?;
        if let Err(e) = tokio::fs::write(&pdf_path, pdf.as_bytes()).await {
            // a lone XML would look like a finished key on the next run
            if let Err(rm) = tokio::fs::remove_file(&xml_path).await {
                warn!(path = %xml_path.display(), error = %rm, "storage: could not remove orphan xml");
            }
            return Err(e.into());
        }

        info!(branch = %branch, nnf = %stem, xml = %xml_path.display(), pdf = %pdf_path.display(), "storage: documents saved");
        Ok(SavedPaths {
            xml: xml_path,
            pdf: pdf_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::Path;

    fn store(dir: &Path) -> FsDocumentStore {
        FsDocumentStore::builder().base_dir(dir).build()
    }

    fn docs() -> (RawDocument, RawDocument) {
        (
            RawDocument::from(b"<nfeProc/>".as_slice()),
            RawDocument::from(b"%PDF-1.4".as_slice()),
        )
    }

    #[tokio::test]
    async fn writes_documents_into_branch_date_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (xml, pdf) = docs();
        let branch = BranchCode::builder().digits("4").build();

        let saved = store(dir.path())
            .save(&branch, "2024-01-31", &InvoiceNumber::from("123"), &xml, &pdf)
            .await
            .unwrap();

        let day = dir.path().join("FILIAL 04").join("2024-01-31");
        assert_eq!(saved.xml, day.join("XML").join("123.xml"));
        assert_eq!(saved.pdf, day.join("DANFE").join("123.pdf"));
        assert_eq!(std::fs::read(&saved.xml).unwrap(), b"<nfeProc/>");
        assert_eq!(std::fs::read(&saved.pdf).unwrap(), b"%PDF-1.4");
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("12/34")]
    #[case("..\\x")]
    #[tokio::test]
    async fn unusable_invoice_numbers_touch_nothing(#[case] n_nf: &str) {
        let dir = tempfile::tempdir().unwrap();
        let (xml, pdf) = docs();
        let branch = BranchCode::from("FILIAL 01");

        let result = store(dir.path())
            .save(&branch, "2024-01-31", &InvoiceNumber::from(n_nf), &xml, &pdf)
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (xml, _) = docs();
        let branch = BranchCode::from("FILIAL 01");

        let result = store(dir.path())
            .save(&branch, "2024-01-31", &InvoiceNumber::from("1"), &xml, &RawDocument::default())
            .await;

        assert!(matches!(result, Err(NfeError::EmptyDocument { source_name: "pdf" })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_pdf_write_removes_the_xml() {
        let dir = tempfile::tempdir().unwrap();
        let (xml, pdf) = docs();
        let branch = BranchCode::from("FILIAL 01");
        // a directory where the pdf file should go makes the write fail
        let blocked = dir.path().join("FILIAL 01/2024-01-31/DANFE/9.pdf");
        std::fs::create_dir_all(&blocked).unwrap();

        let result = store(dir.path())
            .save(&branch, "2024-01-31", &InvoiceNumber::from("9"), &xml, &pdf)
            .await;

        assert!(matches!(result, Err(NfeError::Io(_))));
        assert!(!dir.path().join("FILIAL 01/2024-01-31/XML/9.xml").exists());
    }

    #[test]
    fn today_is_iso_date() {
        let d = today();
        assert_eq!(d.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d").is_ok());
    }
}
