//! Stateful sift session
//!
//! Holds the page archive, configuration and pdf.js page texts in Rust so
//! JavaScript only wires DOM events to session methods. The archive lives
//! as long as the session; `clearArchive` empties it explicitly.
//!
//! Page texts are stored with a digest of the bytes they were produced
//! from. An operation on any other document extracts its own text instead.

use crate::validation::quick_validate_xml;
use pagesift_core::export::{XmlExport, EXPORT_FILE_NAME};
use pagesift_core::insert::InsertionReport;
use pagesift_core::{
    fixed_file_name, get_page_count, insert_archived_pages, parse_lines, repair_xml,
    scan_balances, search_keywords, split_by_field, Archive, BalanceScan, LazyText,
    PageTextSource, ProgressSink, ProvidedText, RepairOutcome, SearchReport, SiftConfig,
    SiftError, SplitReport, ARCHIVE_FILE_NAME, SPLIT_FILE_NAME,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use wasm_bindgen::prelude::*;

/// Which uploaded document a set of page texts belongs to
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRole {
    /// Document searched, split or scanned
    Source,
    /// Document that archived pages are inserted into
    Print,
}

/// pdf.js page texts and the document they were produced from
struct DocumentText {
    len: usize,
    digest: [u8; 32],
    text: ProvidedText,
}

impl DocumentText {
    fn new(bytes: &[u8], text: ProvidedText) -> Self {
        Self {
            len: bytes.len(),
            digest: Sha256::digest(bytes).into(),
            text,
        }
    }

    fn describes(&self, bytes: &[u8]) -> bool {
        self.len == bytes.len() && self.digest[..] == Sha256::digest(bytes)[..]
    }
}

/// Page text handed to the core: from pdf.js when it belongs to `bytes`,
/// otherwise extracted on first use
enum PageText<'a> {
    Provided(&'a ProvidedText),
    Lazy(LazyText<'a>),
}

impl PageTextSource for PageText<'_> {
    fn page_count(&self) -> Result<usize, SiftError> {
        match self {
            PageText::Provided(t) => t.page_count(),
            PageText::Lazy(t) => t.page_count(),
        }
    }

    fn page_text(&self, page_index: usize) -> Result<String, SiftError> {
        match self {
            PageText::Provided(t) => t.page_text(page_index),
            PageText::Lazy(t) => t.page_text(page_index),
        }
    }
}

fn page_text_for<'a>(stored: Option<&'a DocumentText>, bytes: &'a [u8]) -> PageText<'a> {
    match stored {
        Some(doc) if doc.describes(bytes) => PageText::Provided(&doc.text),
        _ => PageText::Lazy(LazyText::new(bytes)),
    }
}

/// Forwards core progress to the JavaScript callback
struct JsProgress<'a> {
    callback: Option<&'a js_sys::Function>,
}

impl ProgressSink for JsProgress<'_> {
    fn report(&mut self, current: usize, total: usize, message: &str) {
        if let Some(callback) = self.callback {
            let this = JsValue::null();
            let _ = callback.call3(
                &this,
                &JsValue::from(current as u32),
                &JsValue::from(total as u32),
                &JsValue::from_str(message),
            );
        }
    }
}

#[derive(Serialize)]
struct RepairResultJs<'a> {
    file_name: String,
    outcome: &'a RepairOutcome,
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn bytes_to_js(bytes: &[u8]) -> js_sys::Uint8Array {
    let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
    array.copy_from(bytes);
    array
}

/// `{ report, document, fileName }` for operations that produce a PDF
fn report_with_document<T: Serialize>(
    report: &T,
    document: Option<&[u8]>,
    file_name: &str,
) -> Result<JsValue, JsValue> {
    let result = js_sys::Object::new();
    js_sys::Reflect::set(&result, &"report".into(), &to_js(report)?)?;
    let document = match document {
        Some(bytes) => bytes_to_js(bytes).into(),
        None => JsValue::null(),
    };
    js_sys::Reflect::set(&result, &"document".into(), &document)?;
    js_sys::Reflect::set(&result, &"fileName".into(), &JsValue::from_str(file_name))?;
    Ok(result.into())
}

#[wasm_bindgen]
pub struct SiftSession {
    config: SiftConfig,
    archive: Archive,
    source_text: Option<DocumentText>,
    print_text: Option<DocumentText>,
    last_repair: Option<RepairOutcome>,
    progress_callback: Option<js_sys::Function>,
}

impl Default for SiftSession {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl SiftSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let config = SiftConfig::default();
        Self {
            archive: Archive::with_policy(config.archive.collision),
            config,
            source_text: None,
            print_text: None,
            last_repair: None,
            progress_callback: None,
        }
    }

    /// Callback signature: (current: number, total: number, message: string) => void
    #[wasm_bindgen(js_name = setProgressCallback)]
    pub fn set_progress_callback(&mut self, callback: js_sys::Function) {
        self.progress_callback = Some(callback);
    }

    /// Replace the configuration with a JSON document; omitted fields take defaults
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, json: &str) -> Result<(), JsValue> {
        self.set_config_internal(json)
            .map_err(|e| JsValue::from_str(&e))
    }

    fn set_config_internal(&mut self, json: &str) -> Result<(), String> {
        let config = SiftConfig::from_json(json).map_err(|e| e.to_string())?;
        self.archive.set_policy(config.archive.collision);
        self.config = config;
        Ok(())
    }

    /// Store per-page text produced by pdf.js from `bytes`.
    ///
    /// Used by later operations on `role` as long as they receive the same
    /// bytes; replaces any text stored for that role.
    #[wasm_bindgen(js_name = setPageTexts)]
    pub fn set_page_texts(
        &mut self,
        role: DocumentRole,
        bytes: &[u8],
        pages: Vec<String>,
    ) -> Result<(), JsValue> {
        self.set_page_texts_internal(role, bytes, pages)
            .map_err(|e| JsValue::from_str(&e))
    }

    fn set_page_texts_internal(
        &mut self,
        role: DocumentRole,
        bytes: &[u8],
        pages: Vec<String>,
    ) -> Result<(), String> {
        let page_count = get_page_count(bytes).map_err(|e| e.to_string())? as usize;
        if pages.len() != page_count {
            return Err(format!(
                "Page text does not match document ({} pages of text, {} pages in PDF)",
                pages.len(),
                page_count
            ));
        }
        let text = Some(DocumentText::new(bytes, ProvidedText::new(pages)));
        match role {
            DocumentRole::Source => self.source_text = text,
            DocumentRole::Print => self.print_text = text,
        }
        Ok(())
    }

    fn search_keywords_internal(
        &mut self,
        bytes: &[u8],
        keywords: &str,
    ) -> Result<SearchReport, String> {
        let text = page_text_for(self.source_text.as_ref(), bytes);
        let mut progress = JsProgress {
            callback: self.progress_callback.as_ref(),
        };
        search_keywords(
            bytes,
            &text,
            &parse_lines(keywords),
            &mut self.archive,
            &self.config.search,
            &mut progress,
        )
        .map_err(|e| e.to_string())
    }

    /// Archive the first page containing each keyword (one keyword per line)
    #[wasm_bindgen(js_name = searchKeywords)]
    pub fn search_keywords(&mut self, bytes: &[u8], keywords: &str) -> Result<JsValue, JsValue> {
        let report = self
            .search_keywords_internal(bytes, keywords)
            .map_err(|e| JsValue::from_str(&e))?;
        to_js(&report)
    }

    fn split_by_field_internal(
        &self,
        bytes: &[u8],
        filter_key: &str,
        values: &str,
    ) -> Result<SplitReport, String> {
        let text = page_text_for(self.source_text.as_ref(), bytes);
        let mut progress = JsProgress {
            callback: self.progress_callback.as_ref(),
        };
        split_by_field(bytes, &text, filter_key, &parse_lines(values), &mut progress)
            .map_err(|e| e.to_string())
    }

    /// Collect the records whose `filterKey` field matches one of `values` (one per line)
    #[wasm_bindgen(js_name = splitByField)]
    pub fn split_by_field(
        &self,
        bytes: &[u8],
        filter_key: &str,
        values: &str,
    ) -> Result<JsValue, JsValue> {
        let report = self
            .split_by_field_internal(bytes, filter_key, values)
            .map_err(|e| JsValue::from_str(&e))?;
        report_with_document(&report, report.document.as_deref(), SPLIT_FILE_NAME)
    }

    fn insert_archived_internal(
        &self,
        print_bytes: &[u8],
        keywords: &str,
    ) -> Result<InsertionReport, String> {
        let text = page_text_for(self.print_text.as_ref(), print_bytes);
        let mut progress = JsProgress {
            callback: self.progress_callback.as_ref(),
        };
        insert_archived_pages(
            print_bytes,
            &text,
            &parse_lines(keywords),
            &self.archive,
            &self.config.insert,
            &mut progress,
        )
        .map_err(|e| e.to_string())
    }

    /// Insert archived pages into the print document after each keyword's page
    #[wasm_bindgen(js_name = insertArchived)]
    pub fn insert_archived(&self, print_bytes: &[u8], keywords: &str) -> Result<JsValue, JsValue> {
        let report = self
            .insert_archived_internal(print_bytes, keywords)
            .map_err(|e| JsValue::from_str(&e))?;
        let document = report.outcome.document.as_slice();
        report_with_document(&report, Some(document), "print_with_inserts.pdf")
    }

    fn scan_balances_internal(&self, bytes: &[u8]) -> Result<BalanceScan, String> {
        let text = page_text_for(self.source_text.as_ref(), bytes);
        let mut progress = JsProgress {
            callback: self.progress_callback.as_ref(),
        };
        scan_balances(&text, &mut progress).map_err(|e| e.to_string())
    }

    /// Pages with negative opening or closing balances
    #[wasm_bindgen(js_name = scanBalances)]
    pub fn scan_balances(&self, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let scan = self
            .scan_balances_internal(bytes)
            .map_err(|e| JsValue::from_str(&e))?;
        to_js(&scan)
    }

    fn repair_xml_internal(&mut self, text: &str) -> Result<&RepairOutcome, String> {
        quick_validate_xml(text)?;
        let outcome = repair_xml(text, &self.config.repair).map_err(|e| e.to_string())?;
        Ok(&*self.last_repair.insert(outcome))
    }

    /// Remove control characters until the file parses; keeps the result for `exportXml`
    #[wasm_bindgen(js_name = repairXml)]
    pub fn repair_xml(&mut self, name: &str, text: &str) -> Result<JsValue, JsValue> {
        self.last_repair = None;
        let outcome = self
            .repair_xml_internal(text)
            .map_err(|e| JsValue::from_str(&e))?;
        to_js(&RepairResultJs {
            file_name: fixed_file_name(name),
            outcome,
        })
    }

    fn export_xml_internal(&self) -> Result<Vec<u8>, String> {
        let outcome = self
            .last_repair
            .as_ref()
            .ok_or_else(|| "Repair an XML file first".to_string())?;
        XmlExport::new(&outcome.records, &outcome.invalid, &outcome.fixes)
            .to_zip()
            .map_err(|e| e.to_string())
    }

    /// CSV sheets of the last repaired file, zipped
    #[wasm_bindgen(js_name = exportXml)]
    pub fn export_xml(&self) -> Result<js_sys::Uint8Array, JsValue> {
        let bytes = self.export_xml_internal().map_err(|e| JsValue::from_str(&e))?;
        Ok(bytes_to_js(&bytes))
    }

    #[wasm_bindgen(getter, js_name = exportFileName)]
    pub fn export_file_name(&self) -> String {
        EXPORT_FILE_NAME.to_string()
    }

    /// Every archived page as `<key>.pdf` in one zip
    #[wasm_bindgen(js_name = archiveZip)]
    pub fn archive_zip(&self) -> Result<js_sys::Uint8Array, JsValue> {
        if self.archive.is_empty() {
            return Err(JsValue::from_str("No extracted pages to download"));
        }
        let bytes = self
            .archive
            .to_zip()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(bytes_to_js(&bytes))
    }

    #[wasm_bindgen(getter, js_name = archiveFileName)]
    pub fn archive_file_name(&self) -> String {
        ARCHIVE_FILE_NAME.to_string()
    }

    #[wasm_bindgen(js_name = archiveEntry)]
    pub fn archive_entry(&self, key: &str) -> Option<js_sys::Uint8Array> {
        self.archive.get(key).map(bytes_to_js)
    }

    #[wasm_bindgen(js_name = archiveKeys)]
    pub fn archive_keys(&self) -> Vec<String> {
        self.archive.keys().map(str::to_string).collect()
    }

    #[wasm_bindgen(js_name = clearArchive)]
    pub fn clear_archive(&mut self) {
        self.archive.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};

    /// Create a PDF with one page per label
    pub(crate) fn create_test_pdf(labels: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources = Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
        )]);

        let mut page_ids = Vec::new();
        for label in labels {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                    ),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            label.as_bytes().to_vec(),
                            lopdf::StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
                ("Resources", Object::Dictionary(resources.clone())),
                ("Contents", Object::Reference(content_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(labels.len() as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn texts(pages: &[&str]) -> Vec<String> {
        pages.iter().map(|s| s.to_string()).collect()
    }

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn test_new_session_has_empty_archive() {
        let session = SiftSession::new();
        assert!(session.archive_keys().is_empty());
        assert!(session.last_repair.is_none());
    }

    #[test]
    fn test_search_fills_archive() {
        let mut session = SiftSession::new();
        let pdf = create_test_pdf(&["P1", "P2", "P3"]);
        session
            .set_page_texts_internal(
                DocumentRole::Source,
                &pdf,
                texts(&["cover", "Total INVOICE-42", "Order 7"]),
            )
            .unwrap();

        let report = session
            .search_keywords_internal(&pdf, "INVOICE-42\n\nOrder 7\nmissing")
            .unwrap();

        assert_eq!(report.found_count(), 2);
        assert_eq!(report.not_found, vec!["missing".to_string()]);
        assert_eq!(session.archive_keys(), vec!["invoice_42", "order_7"]);
    }

    #[test]
    fn test_page_text_must_match_document() {
        let mut session = SiftSession::new();
        let pdf = create_test_pdf(&["P1", "P2"]);

        let err = session
            .set_page_texts_internal(DocumentRole::Source, &pdf, texts(&["only one"]))
            .unwrap_err();
        assert!(err.contains("does not match"));
        assert!(session.source_text.is_none());
    }

    #[test]
    fn test_page_texts_apply_only_to_their_document() {
        let mut session = SiftSession::new();
        let first = create_test_pdf(&["A1", "A2"]);
        session
            .set_page_texts_internal(DocumentRole::Source, &first, texts(&["alpha", "INVOICE-42"]))
            .unwrap();
        let report = session.search_keywords_internal(&first, "INVOICE-42").unwrap();
        assert_eq!(report.found_count(), 1);

        // Same page count, different document: its own text is extracted
        let second = create_test_pdf(&["B1", "B2"]);
        let report = session.search_keywords_internal(&second, "INVOICE-42\nB2").unwrap();

        assert_eq!(report.not_found, vec!["INVOICE-42".to_string()]);
        assert_eq!(report.extracted.len(), 1);
        assert_eq!(report.extracted[0].key, "b2");
    }

    #[test]
    fn test_page_texts_replaced_per_role() {
        let mut session = SiftSession::new();
        let first = create_test_pdf(&["A1"]);
        let second = create_test_pdf(&["B1"]);
        session
            .set_page_texts_internal(DocumentRole::Source, &first, texts(&["alpha"]))
            .unwrap();
        session
            .set_page_texts_internal(DocumentRole::Source, &second, texts(&["beta"]))
            .unwrap();

        let report = session.search_keywords_internal(&first, "alpha").unwrap();
        assert_eq!(report.not_found, vec!["alpha".to_string()]);
    }

    #[test]
    fn test_empty_bytes_rejected_before_extraction() {
        let mut session = SiftSession::new();
        let err = session.search_keywords_internal(&[], "x").unwrap_err();
        assert!(err.contains("Please select a PDF file"));

        let err = session.scan_balances_internal(&[]).unwrap_err();
        assert!(err.contains("Please select a PDF file"));
    }

    #[test]
    fn test_blank_keywords_rejected() {
        let mut session = SiftSession::new();
        let pdf = create_test_pdf(&["P1"]);
        let err = session.search_keywords_internal(&pdf, "  \n ").unwrap_err();
        assert!(err.contains("Enter at least one keyword"));
    }

    #[test]
    fn test_insert_uses_archive_from_earlier_search() {
        let mut session = SiftSession::new();
        let source = create_test_pdf(&["S1", "S2"]);
        session
            .set_page_texts_internal(DocumentRole::Source, &source, texts(&["acme", "globex"]))
            .unwrap();
        session.search_keywords_internal(&source, "acme\nglobex").unwrap();

        let print = create_test_pdf(&["T1", "T2", "T3"]);
        session
            .set_page_texts_internal(
                DocumentRole::Print,
                &print,
                texts(&["customer ACME", "customer GLOBEX", "end"]),
            )
            .unwrap();
        let report = session
            .insert_archived_internal(&print, "globex\nacme")
            .unwrap();

        assert_eq!(report.outcome.applied.len(), 2);
        assert_eq!(page_count(&report.outcome.document), 7);
    }

    #[test]
    fn test_clear_archive() {
        let mut session = SiftSession::new();
        let pdf = create_test_pdf(&["P1"]);
        session
            .set_page_texts_internal(DocumentRole::Source, &pdf, texts(&["alpha"]))
            .unwrap();
        session.search_keywords_internal(&pdf, "alpha").unwrap();
        assert!(session.archive.bytes_of("alpha").is_some());

        session.clear_archive();
        assert!(session.archive_keys().is_empty());
    }

    #[test]
    fn test_config_sets_collision_policy() {
        let mut session = SiftSession::new();
        session
            .set_config_internal(r#"{"archive": {"collision": "reject"}}"#)
            .unwrap();

        let pdf = create_test_pdf(&["P1", "P2"]);
        session
            .set_page_texts_internal(DocumentRole::Source, &pdf, texts(&["Order A-1", "Order A 1"]))
            .unwrap();
        let report = session
            .search_keywords_internal(&pdf, "Order A-1\nOrder A 1")
            .unwrap();

        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut session = SiftSession::new();
        assert!(session.set_config_internal("not json").is_err());
        assert!(session
            .set_config_internal(r#"{"repair": {"max_fixes": 0}}"#)
            .is_err());
    }

    #[test]
    fn test_split_by_field() {
        let pdf = create_test_pdf(&["A1", "A2", "B1"]);
        let mut session = SiftSession::new();
        session
            .set_page_texts_internal(
                DocumentRole::Source,
                &pdf,
                texts(&["Account: 1", "more", "Account: 2"]),
            )
            .unwrap();

        let report = session
            .split_by_field_internal(&pdf, "Account", "2\n1")
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.page_count, 3);
    }

    #[test]
    fn test_scan_balances() {
        let pdf = create_test_pdf(&["A", "B"]);
        let mut session = SiftSession::new();
        session
            .set_page_texts_internal(
                DocumentRole::Source,
                &pdf,
                texts(&["Opening Balance $5.00", "Closing Balance -$1.00"]),
            )
            .unwrap();

        let scan = session.scan_balances_internal(&pdf).unwrap();
        assert!(scan.negative_opening.is_empty());
        assert_eq!(scan.negative_closing, vec![2]);
    }

    #[test]
    fn test_repair_then_export() {
        let mut session = SiftSession::new();
        assert!(session.export_xml_internal().is_err());

        let outcome = session
            .repair_xml_internal("<rows><row><a>x\u{0B}y</a></row></rows>")
            .unwrap();
        assert_eq!(outcome.fixes.len(), 1);

        let zip = session.export_xml_internal().unwrap();
        assert!(zip.starts_with(b"PK"));
    }

    #[test]
    fn test_repair_rejects_non_xml() {
        let mut session = SiftSession::new();
        assert!(session.repair_xml_internal("").is_err());
        assert!(session.last_repair.is_none());
    }
}
