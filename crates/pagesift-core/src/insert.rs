//! Insertion planning and sequential page insertion
//!
//! Keywords are located in a second "print" document, sorted by target page
//! and applied in that order. Each insertion shifts every later page, so
//! the inserter keeps a running count of pages added so far and offsets
//! each target by it.

use crate::archive::{archive_key, Archive};
use crate::assemble::{load_document, PdfAssembly};
use crate::config::{InsertAnchor, InsertConfig};
use crate::error::{ItemFailure, SiftError};
use crate::locate::{locate, locate_next_boundary, record_range, PagePredicate};
use crate::normalize::{CaseMode, MatchKey};
use crate::progress::{progress_message, ProgressSink};
use crate::text::PageTextSource;
use serde::Serialize;
use tracing::{debug, info, warn};

/// A keyword and the 1-indexed print page it targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertionPoint {
    pub keyword: String,
    pub target_page: u32,
}

impl InsertionPoint {
    pub fn new(keyword: &str, target_page: u32) -> Self {
        Self {
            keyword: keyword.to_string(),
            target_page,
        }
    }
}

/// Insertion points in ascending target-page order; ties keep discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertionPlan {
    points: Vec<InsertionPoint>,
}

impl InsertionPlan {
    pub fn new(mut points: Vec<InsertionPoint>) -> Self {
        // sort_by_key is stable
        points.sort_by_key(|p| p.target_page);
        Self { points }
    }

    pub fn points(&self) -> &[InsertionPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Insertion points for `keywords` located in the print document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocatedPoints {
    pub points: Vec<InsertionPoint>,
    pub not_located: Vec<String>,
}

/// Find the target page of each keyword in the print document
pub fn locate_insertion_points<S: PageTextSource + ?Sized>(
    print_text: &S,
    keywords: &[String],
    anchor: &InsertAnchor,
    case: CaseMode,
) -> Result<LocatedPoints, SiftError> {
    let boundary = match anchor {
        InsertAnchor::MatchPage => None,
        InsertAnchor::RecordEnd { markers } => {
            let markers: Vec<&str> = markers
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .collect();
            Some(PagePredicate::all_of(&markers, case))
        }
    };

    let mut located = LocatedPoints::default();
    for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        let predicate = PagePredicate::Contains(MatchKey::new(keyword, case));
        let Some(page) = locate(print_text, &predicate, 1)? else {
            located.not_located.push(keyword.to_string());
            continue;
        };
        let target_page = match &boundary {
            None => page,
            Some(boundary) => {
                record_range(page, locate_next_boundary(print_text, boundary, page)?).end
            }
        };
        located.points.push(InsertionPoint::new(keyword, target_page));
    }

    Ok(located)
}

/// One archived page placed into the target document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedInsertion {
    pub keyword: String,
    pub target_page: u32,
    /// 0-based position of the inserted page in the document at insertion time
    pub index: usize,
    pub padded: bool,
    /// Document length after this insertion
    pub page_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsertionOutcome {
    pub applied: Vec<AppliedInsertion>,
    /// Keywords with no archived page
    pub not_found: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub original_page_count: usize,
    pub page_count: usize,
    #[serde(skip)]
    pub document: Vec<u8>,
}

/// Apply `plan` to the target document, taking pages from `archive`
pub fn apply_plan(
    target_bytes: &[u8],
    plan: &InsertionPlan,
    archive: &Archive,
    config: &InsertConfig,
    progress: &mut dyn ProgressSink,
) -> Result<InsertionOutcome, SiftError> {
    let mut target = PdfAssembly::load(target_bytes)?;
    let mut outcome = InsertionOutcome {
        original_page_count: target.page_count(),
        ..Default::default()
    };
    let case = CaseMode::from_sensitive(config.case_sensitive);
    let offset = config.placement.offset() as usize;
    let mut inserted = 0usize;
    let total = plan.len();

    for (i, point) in plan.points().iter().enumerate() {
        let key = archive_key(&MatchKey::new(&point.keyword, case));
        match archive.get(&key) {
            None => outcome.not_found.push(point.keyword.clone()),
            Some(bytes) => {
                let index = (point.target_page as usize + inserted)
                    .saturating_sub(offset)
                    .min(target.page_count());
                match insert_archived(&mut target, bytes, index, config.pad_with_blank) {
                    Ok(padded) => {
                        inserted += if padded { 2 } else { 1 };
                        debug!(
                            keyword = %point.keyword,
                            target_page = point.target_page,
                            index,
                            padded,
                            "Inserted archived page"
                        );
                        outcome.applied.push(AppliedInsertion {
                            keyword: point.keyword.clone(),
                            target_page: point.target_page,
                            index,
                            padded,
                            page_count: target.page_count(),
                        });
                    }
                    Err(e) => {
                        warn!(keyword = %point.keyword, error = %e, "Insertion failed");
                        outcome.failures.push(ItemFailure::new(&point.keyword, &e));
                    }
                }
            }
        }
        progress.report(i + 1, total, &progress_message(i + 1, total));
    }

    outcome.page_count = target.page_count();
    outcome.document = target.save()?;

    info!(
        inserted = outcome.applied.len(),
        not_found = outcome.not_found.len(),
        pages = outcome.page_count,
        "Insertion complete"
    );

    Ok(outcome)
}

/// Insert the first page of `archived` at `index`; returns whether a blank page followed it
fn insert_archived(
    target: &mut PdfAssembly,
    archived: &[u8],
    index: usize,
    pad: bool,
) -> Result<bool, SiftError> {
    let source = load_document(archived)?;
    let handle = target
        .copy_pages(&source, &[0])?
        .into_iter()
        .next()
        .ok_or_else(|| SiftError::OperationError("Archived document has no pages".into()))?;

    target.insert_page(index, Some(handle))?;

    let is_last = index + 1 == target.page_count();
    if pad && !is_last {
        target.insert_page(index + 1, None)?;
        return Ok(true);
    }
    Ok(false)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsertionReport {
    pub plan: InsertionPlan,
    /// Keywords absent from the print document
    pub not_located: Vec<String>,
    pub outcome: InsertionOutcome,
}

/// Locate, plan and apply in one step
pub fn insert_archived_pages<S: PageTextSource + ?Sized>(
    print_bytes: &[u8],
    print_text: &S,
    keywords: &[String],
    archive: &Archive,
    config: &InsertConfig,
    progress: &mut dyn ProgressSink,
) -> Result<InsertionReport, SiftError> {
    if print_bytes.is_empty() {
        return Err(SiftError::InvalidInput(
            "Please select the print PDF".into(),
        ));
    }
    if keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(SiftError::InvalidInput(
            "Enter at least one keyword".into(),
        ));
    }

    let case = CaseMode::from_sensitive(config.case_sensitive);
    let located = locate_insertion_points(print_text, keywords, &config.anchor, case)?;
    let plan = InsertionPlan::new(located.points);
    let outcome = apply_plan(print_bytes, &plan, archive, config, progress)?;

    Ok(InsertionReport {
        plan,
        not_located: located.not_located,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Placement;
    use crate::progress::NoProgress;
    use crate::testing::{create_test_pdf, page_count, page_labels};
    use crate::text::ProvidedText;
    use pretty_assertions::assert_eq;

    fn archive_with(entries: &[(&str, &str)]) -> Archive {
        let mut archive = Archive::new();
        for (key, label) in entries {
            archive
                .insert(key, create_test_pdf(&[*label]))
                .unwrap();
        }
        archive
    }

    fn points(list: &[(&str, u32)]) -> Vec<InsertionPoint> {
        list.iter().map(|(k, p)| InsertionPoint::new(k, *p)).collect()
    }

    #[test]
    fn test_plan_sorts_ascending() {
        let plan = InsertionPlan::new(points(&[("b", 5), ("a", 3)]));
        let targets: Vec<u32> = plan.points().iter().map(|p| p.target_page).collect();
        assert_eq!(targets, vec![3, 5]);
    }

    #[test]
    fn test_plan_keeps_tie_order() {
        let plan = InsertionPlan::new(points(&[("x", 2), ("y", 1), ("z", 2), ("w", 1)]));
        let keys: Vec<&str> = plan.points().iter().map(|p| p.keyword.as_str()).collect();
        assert_eq!(keys, vec!["y", "w", "x", "z"]);
    }

    #[test]
    fn test_offset_applies_in_plan_order() {
        let target = create_test_pdf(&["T1", "T2", "T3", "T4", "T5", "T6"]);
        let archive = archive_with(&[("five", "F"), ("three", "H")]);
        let plan = InsertionPlan::new(points(&[("five", 5), ("three", 3)]));

        let outcome = apply_plan(
            &target,
            &plan,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(outcome.applied[0].keyword, "three");
        assert_eq!(outcome.applied[0].index, 3);
        // Two pages were added before page five's point was applied
        assert_eq!(outcome.applied[1].index, 7);
        assert_eq!(
            page_labels(&outcome.document),
            vec!["T1", "T2", "T3", "H", "", "T4", "T5", "F", "", "T6"]
        );
    }

    #[test]
    fn test_before_marker_placement() {
        let target = create_test_pdf(&["T1", "T2", "T3"]);
        let archive = archive_with(&[("k", "K")]);
        let plan = InsertionPlan::new(points(&[("k", 2)]));
        let config = InsertConfig {
            placement: Placement::BeforeMarker,
            ..Default::default()
        };

        let outcome = apply_plan(&target, &plan, &archive, &config, &mut NoProgress).unwrap();
        assert_eq!(
            page_labels(&outcome.document),
            vec!["T1", "K", "", "T2", "T3"]
        );
    }

    #[test]
    fn test_no_padding_at_end_of_document() {
        let target = create_test_pdf(&["T1", "T2"]);
        let archive = archive_with(&[("k", "K")]);
        let plan = InsertionPlan::new(points(&[("k", 2)]));

        let outcome = apply_plan(
            &target,
            &plan,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert!(!outcome.applied[0].padded);
        assert_eq!(page_labels(&outcome.document), vec!["T1", "T2", "K"]);
    }

    #[test]
    fn test_padding_disabled() {
        let target = create_test_pdf(&["T1", "T2"]);
        let archive = archive_with(&[("k", "K")]);
        let plan = InsertionPlan::new(points(&[("k", 1)]));
        let config = InsertConfig {
            pad_with_blank: false,
            ..Default::default()
        };

        let outcome = apply_plan(&target, &plan, &archive, &config, &mut NoProgress).unwrap();
        assert_eq!(page_labels(&outcome.document), vec!["T1", "K", "T2"]);
    }

    #[test]
    fn test_unresolved_keyword_does_not_change_length() {
        let target = create_test_pdf(&["T1", "T2", "T3"]);
        let archive = archive_with(&[("known", "K")]);
        let plan = InsertionPlan::new(points(&[("missing", 1), ("known", 1)]));

        let outcome = apply_plan(
            &target,
            &plan,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(outcome.not_found, vec!["missing".to_string()]);
        assert_eq!(outcome.applied[0].index, 1);
        assert_eq!(outcome.page_count, 5);
        assert_eq!(page_count(&outcome.document), 5);
    }

    #[test]
    fn test_archive_lookup_is_case_insensitive_by_default() {
        let target = create_test_pdf(&["T1", "T2"]);
        let archive = archive_with(&[("invoice_42", "I")]);
        let plan = InsertionPlan::new(points(&[("INVOICE-42", 1)]));

        let outcome = apply_plan(
            &target,
            &plan,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.applied.len(), 1);
    }

    #[test]
    fn test_corrupt_archive_entry_is_item_failure() {
        let target = create_test_pdf(&["T1", "T2"]);
        let mut archive = archive_with(&[("good", "G")]);
        archive.insert("bad", b"not a pdf".to_vec()).unwrap();
        let plan = InsertionPlan::new(points(&[("bad", 1), ("good", 1)]));

        let outcome = apply_plan(
            &target,
            &plan,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.applied[0].index, 1);
        assert_eq!(page_labels(&outcome.document), vec!["T1", "G", "", "T2"]);
    }

    #[test]
    fn test_locate_points_match_page() {
        let print: ProvidedText = ["intro", "Customer ACME", "x", "customer globex"]
            .into_iter()
            .collect();
        let keywords = vec!["Globex".to_string(), "acme".to_string(), "none".to_string()];

        let located = locate_insertion_points(
            &print,
            &keywords,
            &InsertAnchor::MatchPage,
            CaseMode::Insensitive,
        )
        .unwrap();

        assert_eq!(
            located.points,
            vec![InsertionPoint::new("Globex", 4), InsertionPoint::new("acme", 2)]
        );
        assert_eq!(located.not_located, vec!["none".to_string()]);
    }

    #[test]
    fn test_locate_points_record_end() {
        let print: ProvidedText = [
            "Customer ID 1 Recipient ID 1 ACME",
            "acme page 2",
            "Customer ID 2 Recipient ID 2 GLOBEX",
        ]
        .into_iter()
        .collect();
        let anchor = InsertAnchor::RecordEnd {
            markers: vec!["customer id".into(), "recipient id".into()],
        };
        let keywords = vec!["acme".to_string(), "globex".to_string()];

        let located =
            locate_insertion_points(&print, &keywords, &anchor, CaseMode::Insensitive).unwrap();

        assert_eq!(
            located.points,
            vec![InsertionPoint::new("acme", 2), InsertionPoint::new("globex", 3)]
        );
    }

    #[test]
    fn test_insert_archived_pages_end_to_end() {
        let print_pdf = create_test_pdf(&["T1", "T2", "T3"]);
        let print_text: ProvidedText = ["gamma", "alpha", "beta"].into_iter().collect();
        let archive = archive_with(&[("alpha", "A"), ("beta", "B")]);
        let keywords: Vec<String> = ["beta", "alpha", "delta"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = insert_archived_pages(
            &print_pdf,
            &print_text,
            &keywords,
            &archive,
            &InsertConfig::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.not_located, vec!["delta".to_string()]);
        assert_eq!(report.plan.points()[0].keyword, "alpha");
        assert_eq!(
            page_labels(&report.outcome.document),
            vec!["T1", "T2", "A", "", "T3", "B"]
        );
    }

    #[test]
    fn test_insert_requires_keywords() {
        let print_pdf = create_test_pdf(&["T1"]);
        let result = insert_archived_pages(
            &print_pdf,
            &ProvidedText::default(),
            &[" ".to_string()],
            &Archive::new(),
            &InsertConfig::default(),
            &mut NoProgress,
        );
        assert!(matches!(result, Err(SiftError::InvalidInput(_))));
    }
}
