//! Keyword page locator
//!
//! Pages are numbered from 1 here. The conversion to the 0-based index of
//! [`PageTextSource`] happens only inside this module.

use crate::error::SiftError;
use crate::normalize::{fold_case, normalize, CaseMode, MatchKey};
use crate::text::PageTextSource;
use regex::Regex;

/// Test applied to the normalized text of one page
#[derive(Debug, Clone)]
pub enum PagePredicate {
    /// Literal containment of a normalized keyword
    Contains(MatchKey),
    /// Every marker must appear on the same page
    AllOf(Vec<MatchKey>),
    /// Regular expression match
    Pattern(Regex),
}

impl PagePredicate {
    pub fn contains(keyword: &str, case: CaseMode) -> Self {
        PagePredicate::Contains(MatchKey::new(keyword, case))
    }

    /// Record boundary made of markers that must co-occur
    pub fn all_of<S: AsRef<str>>(markers: &[S], case: CaseMode) -> Self {
        PagePredicate::AllOf(
            markers
                .iter()
                .map(|m| MatchKey::new(m.as_ref(), case))
                .collect(),
        )
    }

    /// Evaluate against text that has already been passed through [`normalize`]
    pub fn matches(&self, normalized_text: &str) -> bool {
        match self {
            PagePredicate::Contains(key) => key.is_in(normalized_text),
            PagePredicate::AllOf(keys) => {
                if keys.is_empty() {
                    return false;
                }
                let folded = fold_case(normalized_text);
                keys.iter().all(|key| match key.case() {
                    CaseMode::Sensitive => normalized_text.contains(key.as_str()),
                    CaseMode::Insensitive => folded.contains(key.as_str()),
                })
            }
            PagePredicate::Pattern(re) => re.is_match(normalized_text),
        }
    }
}

/// Outcome of a next-boundary scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// The next record starts on this page
    Found(u32),
    /// No further boundary; carries the last page number
    EndOfDocument(u32),
}

/// Inclusive page range, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn len(&self) -> u32 {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Normalized text of a 1-indexed page
pub fn normalized_page_text<S: PageTextSource + ?Sized>(
    source: &S,
    page: u32,
) -> Result<String, SiftError> {
    if page == 0 {
        return Err(SiftError::InvalidInput(
            "Page numbers must be >= 1".into(),
        ));
    }
    let text = source.page_text((page - 1) as usize)?;
    Ok(normalize(&text))
}

/// First page at or after `from_page` whose normalized text satisfies `predicate`
pub fn locate<S: PageTextSource + ?Sized>(
    source: &S,
    predicate: &PagePredicate,
    from_page: u32,
) -> Result<Option<u32>, SiftError> {
    let last = source.page_count()? as u32;
    let first = from_page.max(1);

    for page in first..=last {
        let text = normalized_page_text(source, page)?;
        if predicate.matches(&text) {
            return Ok(Some(page));
        }
    }

    Ok(None)
}

/// First page strictly after `after_page` satisfying the boundary predicate
pub fn locate_next_boundary<S: PageTextSource + ?Sized>(
    source: &S,
    boundary: &PagePredicate,
    after_page: u32,
) -> Result<Boundary, SiftError> {
    let last = source.page_count()? as u32;
    match locate(source, boundary, after_page.saturating_add(1))? {
        Some(page) => Ok(Boundary::Found(page)),
        None => Ok(Boundary::EndOfDocument(last)),
    }
}

/// Range of the record starting at `start`.
///
/// The boundary page belongs to the next record, so a found boundary ends
/// the range one page earlier.
pub fn record_range(start: u32, boundary: Boundary) -> PageRange {
    let end = match boundary {
        Boundary::Found(next) => next.saturating_sub(1).max(start),
        Boundary::EndOfDocument(last) => last.max(start),
    };
    PageRange { start, end }
}
