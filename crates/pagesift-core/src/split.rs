//! Filter-by-field record splitting
//!
//! A record starts on the first page matching `"{key}: {value}"` and runs
//! up to the page before the next `"{key}:"` line, or to the end of the
//! document. Every matched record is appended, in value order, to a single
//! output document.

use crate::assemble::{load_document, PdfAssembly};
use crate::error::{ItemFailure, SiftError};
use crate::locate::{locate, locate_next_boundary, record_range, PagePredicate, PageRange};
use crate::progress::{progress_message, ProgressSink};
use crate::text::PageTextSource;
use lopdf::Document;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

/// File name of the split output offered for download
pub const SPLIT_FILE_NAME: &str = "split_statements.pdf";

/// Escaped literal tokens joined by optional whitespace
fn flexible_literal(s: &str) -> String {
    s.split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}

fn build_pattern(pattern: &str) -> Result<Regex, SiftError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SiftError::InvalidInput(format!("Invalid filter pattern: {}", e)))
}

/// Pattern for the start of the record whose `key` field equals `value`
pub fn record_start_pattern(key: &str, value: &str) -> Result<Regex, SiftError> {
    build_pattern(&format!(
        r"{}\s*:\s*{}",
        flexible_literal(key),
        flexible_literal(value)
    ))
}

/// Pattern for the start of any record with a `key` field
pub fn record_boundary_pattern(key: &str) -> Result<Regex, SiftError> {
    build_pattern(&format!(r"{}\s*:", flexible_literal(key)))
}

/// Pages extracted for one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordExtraction {
    pub value: String,
    pub range: PageRange,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitReport {
    pub records: Vec<RecordExtraction>,
    pub not_found: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub page_count: usize,
    /// Output PDF, omitted when no page was extracted
    #[serde(skip)]
    pub document: Option<Vec<u8>>,
}

/// Split the document into the records whose `filter_key` field matches one of `values`
pub fn split_by_field<S: PageTextSource + ?Sized>(
    pdf_bytes: &[u8],
    text: &S,
    filter_key: &str,
    values: &[String],
    progress: &mut dyn ProgressSink,
) -> Result<SplitReport, SiftError> {
    if pdf_bytes.is_empty() {
        return Err(SiftError::InvalidInput("Please select a PDF file".into()));
    }
    let filter_key = filter_key.trim();
    if filter_key.is_empty() {
        return Err(SiftError::InvalidInput("Enter a filter key".into()));
    }
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(SiftError::InvalidInput("Enter at least one value".into()));
    }

    let source = load_document(pdf_bytes)?;
    let boundary = PagePredicate::Pattern(record_boundary_pattern(filter_key)?);
    let mut output = PdfAssembly::create();
    let mut report = SplitReport::default();
    let total = values.len();

    for (i, value) in values.iter().enumerate() {
        match split_one(&source, text, filter_key, value, &boundary, &mut output) {
            Ok(Some(range)) => {
                debug!(value, start = range.start, end = range.end, "Extracted record");
                report.records.push(RecordExtraction {
                    value: value.to_string(),
                    range,
                });
            }
            Ok(None) => report.not_found.push(value.to_string()),
            Err(e) => {
                warn!(value, error = %e, "Failed to process value");
                report.failures.push(ItemFailure::new(value, &e));
            }
        }
        progress.report(i + 1, total, &progress_message(i + 1, total));
    }

    report.page_count = output.page_count();
    if report.page_count > 0 {
        report.document = Some(output.save()?);
    }

    info!(
        records = report.records.len(),
        pages = report.page_count,
        not_found = report.not_found.len(),
        failed = report.failures.len(),
        "Split complete"
    );

    Ok(report)
}

fn split_one<S: PageTextSource + ?Sized>(
    source: &Document,
    text: &S,
    filter_key: &str,
    value: &str,
    boundary: &PagePredicate,
    output: &mut PdfAssembly,
) -> Result<Option<PageRange>, SiftError> {
    let start_predicate = PagePredicate::Pattern(record_start_pattern(filter_key, value)?);
    let Some(start) = locate(text, &start_predicate, 1)? else {
        return Ok(None);
    };

    let range = record_range(start, locate_next_boundary(text, boundary, start)?);
    let indices: Vec<usize> = range.pages().map(|p| (p - 1) as usize).collect();

    // Copy every page before placing any, so a failed copy leaves the output untouched
    let handles = output.copy_pages(source, &indices)?;
    for handle in handles {
        output.add_page(handle);
    }

    Ok(Some(range))
}
