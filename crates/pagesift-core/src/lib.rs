//! Keyword page location and page reassembly for PDF documents
//!
//! This crate finds the pages of a document that mention given keywords,
//! extracts them into standalone PDFs kept in an [`Archive`], and inserts
//! archived pages back into a second document at planned positions. It also
//! scans statements for negative balances and repairs XML exports that
//! contain control characters.
//!
//! Page text comes from a [`PageTextSource`]: either `pdf-extract` or text
//! supplied by the caller (pdf.js in the browser).

pub mod archive;
pub mod assemble;
pub mod balance;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod insert;
pub mod locate;
pub mod normalize;
pub mod progress;
pub mod split;
pub mod text;
pub mod xml;

#[cfg(test)]
mod testing;

pub use archive::{archive_key, pdf_file_name, sanitize, Archive, ARCHIVE_FILE_NAME};
pub use assemble::{extract_pages, PdfAssembly};
pub use balance::{scan_balances, Amount, BalanceLabel, BalanceScan, FinancialField};
pub use config::{
    ArchiveConfig, CollisionPolicy, InsertAnchor, InsertConfig, Placement, RepairConfig,
    SearchConfig, SiftConfig,
};
pub use error::{ItemFailure, SiftError};
pub use export::XmlExport;
pub use extract::{search_keywords, MatchResult, SearchReport};
pub use insert::{
    apply_plan, insert_archived_pages, locate_insertion_points, InsertionOutcome, InsertionPlan,
    InsertionPoint, InsertionReport,
};
pub use locate::{locate, locate_next_boundary, record_range, Boundary, PagePredicate, PageRange};
pub use normalize::{fold_case, normalize, parse_lines, CaseMode, MatchKey};
pub use progress::{NoProgress, ProgressSink};
pub use split::{split_by_field, SplitReport, SPLIT_FILE_NAME};
pub use text::{ExtractedText, LazyText, PageTextSource, ProvidedText};
pub use xml::{fixed_file_name, parse_records, repair_xml, RepairOutcome, XmlRepairer};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, SiftError> {
    let doc = assemble::load_document(bytes)?;
    Ok(doc.get_pages().len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_pdf;

    #[test]
    fn test_get_page_count() {
        let pdf = create_test_pdf(&["a", "b", "c"]);
        assert_eq!(get_page_count(&pdf).unwrap(), 3);
    }

    #[test]
    fn test_get_page_count_rejects_garbage() {
        assert!(matches!(
            get_page_count(b"not a pdf"),
            Err(SiftError::ParseError(_))
        ));
    }
}
