//! WASM bindings for keyword page extraction and insertion
//!
//! State lives in Rust inside a `SiftSession`; JavaScript handles DOM events,
//! file I/O and page text extraction with pdf.js.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { SiftSession, DocumentRole } from './pkg/pagesift_wasm.js';
//!
//! await init();
//!
//! const session = new SiftSession();
//! session.setProgressCallback((current, total, msg) => updateUI(current, total, msg));
//!
//! // Extract one page per keyword into the session archive
//! session.setPageTexts(DocumentRole.Source, sourceBytes, await pdfJsPageTexts(sourceBytes));
//! const report = session.searchKeywords(sourceBytes, "INVOICE-42\nINVOICE-43");
//! downloadBlob(session.archiveZip(), session.archiveFileName);
//!
//! // Insert the archived pages into a print run
//! session.setPageTexts(DocumentRole.Print, printBytes, await pdfJsPageTexts(printBytes));
//! const { document } = session.insertArchived(printBytes, "INVOICE-42\nINVOICE-43");
//! ```

pub mod session;
pub mod validation;

use wasm_bindgen::prelude::*;

pub use session::{DocumentRole, SiftSession};
pub use validation::PdfInfo;

/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Returns Ok(()) if the bytes look like a complete PDF
#[wasm_bindgen]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    validation::quick_validate(bytes).map_err(|e| JsValue::from_str(&e))
}

/// Page count, version and metadata, shown before the user picks an operation
#[wasm_bindgen]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = validation::inspect_pdf(bytes).map_err(|e| JsValue::from_str(&e))?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Number of pages, for sizing progress before pdf.js runs
#[wasm_bindgen]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    pagesift_core::get_page_count(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}
