//! Per-page text sources
//!
//! The locator only needs a page count and the text of one page at a time.
//! `ExtractedText` derives text from PDF bytes with pdf-extract;
//! `ProvidedText` wraps strings produced elsewhere (pdf.js in the browser).
//! `LazyText` defers extraction until an operation first asks for text, so
//! input validation runs before any extraction work.

use crate::error::SiftError;
use std::cell::OnceCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Text of a document, addressed by 0-based page index
pub trait PageTextSource {
    fn page_count(&self) -> Result<usize, SiftError>;

    fn page_text(&self, page_index: usize) -> Result<String, SiftError>;
}

/// Page texts supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ProvidedText {
    pages: Vec<String>,
}

impl ProvidedText {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }
}

impl<S: Into<String>> FromIterator<S> for ProvidedText {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl PageTextSource for ProvidedText {
    fn page_count(&self) -> Result<usize, SiftError> {
        Ok(self.pages.len())
    }

    fn page_text(&self, page_index: usize) -> Result<String, SiftError> {
        self.pages.get(page_index).cloned().ok_or_else(|| {
            SiftError::Extraction(format!(
                "Page index {} out of range (document has {} pages)",
                page_index,
                self.pages.len()
            ))
        })
    }
}

/// pdf-extract panics on some malformed inputs (e.g. a font missing from
/// the page resources); the panic is reported as an extraction error
fn extract_by_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("pdf-extract panicked (malformed PDF)".to_string()),
    }
}

/// Page texts extracted from PDF bytes
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pages: ProvidedText,
}

impl ExtractedText {
    pub fn from_pdf(bytes: &[u8]) -> Result<Self, SiftError> {
        let pages = extract_by_pages(bytes).map_err(SiftError::Extraction)?;
        Ok(Self {
            pages: ProvidedText::new(pages),
        })
    }
}

impl PageTextSource for ExtractedText {
    fn page_count(&self) -> Result<usize, SiftError> {
        self.pages.page_count()
    }

    fn page_text(&self, page_index: usize) -> Result<String, SiftError> {
        self.pages.page_text(page_index)
    }
}

/// Text extracted from `bytes` on first use and kept for the life of the value.
///
/// One `LazyText` describes exactly one document; build a new one per
/// operation.
#[derive(Debug)]
pub struct LazyText<'a> {
    bytes: &'a [u8],
    pages: OnceCell<Result<ProvidedText, String>>,
}

impl<'a> LazyText<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pages: OnceCell::new(),
        }
    }

    /// Whether extraction has run
    pub fn is_extracted(&self) -> bool {
        self.pages.get().is_some()
    }

    fn pages(&self) -> Result<&ProvidedText, SiftError> {
        if self.bytes.is_empty() {
            return Err(SiftError::InvalidInput("Please select a PDF file".into()));
        }
        self.pages
            .get_or_init(|| {
                tracing::debug!(bytes = self.bytes.len(), "Extracting page text");
                extract_by_pages(self.bytes).map(ProvidedText::new)
            })
            .as_ref()
            .map_err(|e| SiftError::Extraction(e.clone()))
    }
}

impl PageTextSource for LazyText<'_> {
    fn page_count(&self) -> Result<usize, SiftError> {
        self.pages()?.page_count()
    }

    fn page_text(&self, page_index: usize) -> Result<String, SiftError> {
        self.pages()?.page_text(page_index)
    }
}
