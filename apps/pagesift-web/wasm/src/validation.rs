//! Upload checks for PDF and XML files
//!
//! Cheap header checks run before a document is handed to the core
//! operations, so the page can reject a wrong file immediately.

use lopdf::{Dictionary, Document};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
pub struct PdfInfo {
    pub page_count: u32,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

fn check_header(bytes: &[u8]) -> Result<(), String> {
    if bytes.is_empty() {
        return Err("Please select a PDF file".to_string());
    }
    if bytes.len() < 8 || !bytes.starts_with(b"%PDF-") {
        return Err("Not a valid PDF file (missing %PDF- header)".to_string());
    }
    Ok(())
}

fn header_version(bytes: &[u8]) -> String {
    std::str::from_utf8(&bytes[5..8])
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|_| "1.4".to_string())
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let id = document.trailer.get(b"Info").ok()?.as_reference().ok()?;
    document.get_dictionary(id).ok()
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = info.get(key).ok()?.as_str().ok()?;
    let decoded = String::from_utf8_lossy(bytes);
    (!decoded.is_empty()).then(|| decoded.into_owned())
}

/// Parse the document and describe it
pub fn inspect_pdf(bytes: &[u8]) -> Result<PdfInfo, String> {
    check_header(bytes)?;
    let document = Document::load_mem(bytes).map_err(|e| format!("Failed to parse PDF: {}", e))?;

    let page_count = document.get_pages().len() as u32;
    if page_count == 0 {
        return Err("PDF has no pages".to_string());
    }

    let info = info_dictionary(&document);
    Ok(PdfInfo {
        page_count,
        version: header_version(bytes),
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
        title: info.and_then(|d| info_string(d, b"Title")),
        author: info.and_then(|d| info_string(d, b"Author")),
    })
}

/// Header and trailer check without parsing
pub fn quick_validate(bytes: &[u8]) -> Result<(), String> {
    check_header(bytes)?;
    let tail = &bytes[bytes.len().saturating_sub(1024)..];
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err("PDF appears truncated (missing %%EOF marker)".to_string());
    }
    Ok(())
}

/// Reject empty or non-XML text before a repair run
pub fn quick_validate_xml(text: &str) -> Result<(), String> {
    let trimmed = text.trim_start_matches('\u{FEFF}').trim_start();
    if trimmed.is_empty() {
        return Err("Please select an XML file.".to_string());
    }
    if !trimmed.starts_with('<') {
        return Err("File does not look like XML".to_string());
    }
    Ok(())
}
