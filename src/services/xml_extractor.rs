use roxmltree::{Document, Node};
use tracing::{debug, warn};

use crate::error::{NfeError, NfeResult};
use crate::models::types::InvoiceNumber;

pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

const FIELD: &str = "nNF";

/// Extracts the invoice number (`nNF`) from NF-e XML bytes.
///
/// The first element in document order whose local name ends with `nNF` wins,
/// whatever its namespace. When that yields nothing usable, the canonical
/// `NFe/infNFe/ide/nNF` path in the portal fiscal namespace is tried.
pub fn extract_invoice_number(xml: &[u8]) -> NfeResult<InvoiceNumber> {
    let text = String::from_utf8_lossy(xml);
    let text = text.trim_start_matches('\u{feff}');
    let doc = Document::parse(text)?;

    if let Some(value) = first_suffix_match(&doc) {
        debug!(n_nf = %value, "xml: nNF found by tag scan");
        return Ok(InvoiceNumber::from(value));
    }
    if let Some(value) = namespaced_path(&doc) {
        debug!(n_nf = %value, "xml: nNF found by namespaced path");
        return Ok(InvoiceNumber::from(value));
    }

    warn!("xml: nNF tag not found");
    Err(NfeError::FieldNotFound)
}

fn non_empty_text(node: Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_suffix_match(doc: &Document) -> Option<String> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name().ends_with(FIELD))
        .and_then(non_empty_text)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name((NFE_NAMESPACE, name)))
}

fn namespaced_path(doc: &Document) -> Option<String> {
    let nfe = doc
        .root_element()
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name((NFE_NAMESPACE, "NFe")))?;
    let inf = child(nfe, "infNFe")?;
    let ide = child(inf, "ide")?;
    let n_nf = child(ide, FIELD)?;
    non_empty_text(n_nf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PROC_NFE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe35240112345678000199550010000001231000001234" versao="4.00">
      <ide>
        <cUF>35</cUF>
        <serie>1</serie>
        <nNF>123</nNF>
      </ide>
    </infNFe>
  </NFe>
</nfeProc>"#;

    #[test]
    fn finds_number_in_namespaced_document() {
        let n = extract_invoice_number(PROC_NFE.as_bytes()).unwrap();
        assert_eq!(n.as_str(), "123");
    }

    #[rstest]
    #[case("<nNF>123</nNF>", "123")]
    #[case("<root><nNF>  77 \n</nNF></root>", "77")]
    #[case(r#"<x:root xmlns:x="urn:other"><x:nNF>9</x:nNF></x:root>"#, "9")]
    #[case("<root><refNF><nNF>1</nNF></refNF><nNF>2</nNF></root>", "1")]
    #[case("<root><ide><cNF>5</cNF><nNF>000045</nNF></ide></root>", "000045")]
    fn tag_scan_cases(#[case] xml: &str, #[case] expected: &str) {
        assert_eq!(extract_invoice_number(xml.as_bytes()).unwrap().as_str(), expected);
    }

    #[test]
    fn falls_back_to_namespaced_path_when_first_match_is_empty() {
        let xml = r#"<nfeProc>
  <ref><nNF/></ref>
  <NFe xmlns="http://www.portalfiscal.inf.br/nfe">
    <infNFe><ide><nNF>42</nNF></ide></infNFe>
  </NFe>
</nfeProc>"#;
        assert_eq!(extract_invoice_number(xml.as_bytes()).unwrap().as_str(), "42");
    }

    #[test]
    fn handles_byte_order_mark() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(b"<root><nNF>8</nNF></root>");
        assert_eq!(extract_invoice_number(&bytes).unwrap().as_str(), "8");
    }

    #[rstest]
    #[case(b"")]
    #[case(b"not xml at all")]
    #[case(b"<root><nNF>1</nNF>")]
    #[case(b"<html><body>Erro 500</body>")]
    fn malformed_input_is_parse_error(#[case] bytes: &[u8]) {
        assert!(matches!(extract_invoice_number(bytes), Err(NfeError::Parse(_))));
    }

    #[rstest]
    #[case("<root><cNF>1</cNF></root>")]
    #[case("<root><nNF></nNF></root>")]
    #[case("<root><nNF>   </nNF></root>")]
    fn missing_or_blank_field_is_not_found(#[case] xml: &str) {
        assert!(matches!(
            extract_invoice_number(xml.as_bytes()),
            Err(NfeError::FieldNotFound)
        ));
    }
}
