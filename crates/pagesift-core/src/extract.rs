//! Keyword search: one standalone PDF per found keyword
//!
//! For each keyword the first page containing it is copied into a new
//! single-page document and stored in the session [`Archive`]. Keywords that
//! are never found, and keywords whose copy or save fails, are reported
//! without stopping the remaining keywords.

use crate::archive::{archive_key, pdf_file_name, Archive};
use crate::assemble::{extract_pages, load_document};
use crate::config::SearchConfig;
use crate::error::{ItemFailure, SiftError};
use crate::locate::{locate, PagePredicate};
use crate::normalize::{CaseMode, MatchKey};
use crate::progress::{progress_message, ProgressSink};
use crate::text::PageTextSource;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of searching one keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub keyword: String,
    pub found: bool,
    /// 1-indexed; None exactly when `found` is false
    pub page: Option<u32>,
}

impl MatchResult {
    fn new(keyword: &str, page: Option<u32>) -> Self {
        Self {
            keyword: keyword.to_string(),
            found: page.is_some(),
            page,
        }
    }
}

/// One page stored in the archive by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    pub keyword: String,
    pub key: String,
    pub file_name: String,
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub results: Vec<MatchResult>,
    pub extracted: Vec<ExtractedArtifact>,
    pub not_found: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl SearchReport {
    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|r| r.found).count()
    }
}

/// Search `keywords` in the document and archive each matching page.
///
/// `pdf_bytes` is the document the pages are copied from; `text` must
/// describe the same document.
pub fn search_keywords<S: PageTextSource + ?Sized>(
    pdf_bytes: &[u8],
    text: &S,
    keywords: &[String],
    archive: &mut Archive,
    config: &SearchConfig,
    progress: &mut dyn ProgressSink,
) -> Result<SearchReport, SiftError> {
    if pdf_bytes.is_empty() {
        return Err(SiftError::InvalidInput(
            "Please select a PDF file".into(),
        ));
    }
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err(SiftError::InvalidInput(
            "Enter at least one keyword".into(),
        ));
    }

    let source = load_document(pdf_bytes)?;
    let case = CaseMode::from_sensitive(config.case_sensitive);
    let total = keywords.len();
    let mut report = SearchReport::default();

    for (i, keyword) in keywords.iter().enumerate() {
        let key = MatchKey::new(keyword, case);
        let predicate = PagePredicate::Contains(key.clone());
        let page = match locate(text, &predicate, 1) {
            Ok(page) => page,
            Err(e) => {
                warn!(keyword, error = %e, "Failed to search keyword");
                report.failures.push(ItemFailure::new(keyword, &e));
                progress.report(i + 1, total, &progress_message(i + 1, total));
                continue;
            }
        };
        report.results.push(MatchResult::new(keyword, page));

        match page {
            Some(page) => {
                debug!(keyword, page, "Keyword found");
                let entry_key = archive_key(&key);
                let stored = extract_pages(&source, &[page])
                    .and_then(|bytes| archive.insert(&entry_key, bytes));
                match stored {
                    Ok(()) => report.extracted.push(ExtractedArtifact {
                        keyword: keyword.to_string(),
                        file_name: pdf_file_name(&entry_key),
                        key: entry_key,
                        page,
                    }),
                    Err(e) => {
                        warn!(keyword, error = %e, "Failed to extract page");
                        report.failures.push(ItemFailure::new(keyword, &e));
                    }
                }
            }
            None => report.not_found.push(keyword.to_string()),
        }

        progress.report(i + 1, total, &progress_message(i + 1, total));
    }

    info!(
        found = report.found_count(),
        not_found = report.not_found.len(),
        failed = report.failures.len(),
        "Keyword search complete"
    );

    Ok(report)
}
