//! Whitespace collapsing and match keys
//!
//! Every matcher compares normalized text against a normalized keyword.
//! Case folding is a separate opt-in step because keyword search is
//! case-sensitive while insertion matching is not.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Replace every maximal run of whitespace with a single space.
///
/// Leading and trailing runs become a single space too; trimming is left to the caller.
pub fn normalize(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s, " ").into_owned()
}

/// Lower-case `s`
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

/// Whether comparisons fold case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseMode {
    pub fn from_sensitive(case_sensitive: bool) -> Self {
        if case_sensitive {
            CaseMode::Sensitive
        } else {
            CaseMode::Insensitive
        }
    }

    /// Normalize `s` and fold it if this mode requires
    pub fn apply(self, s: &str) -> String {
        let normalized = normalize(s);
        match self {
            CaseMode::Sensitive => normalized,
            CaseMode::Insensitive => fold_case(&normalized),
        }
    }
}

/// Normalized form of a user keyword; the equality basis for matching and archive lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    text: String,
    case: CaseMode,
}

impl MatchKey {
    pub fn new(keyword: &str, case: CaseMode) -> Self {
        Self {
            text: case.apply(keyword),
            case,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn case(&self) -> CaseMode {
        self.case
    }

    /// Check an already-normalized page text for this key
    pub fn is_in(&self, normalized_text: &str) -> bool {
        match self.case {
            CaseMode::Sensitive => normalized_text.contains(&self.text),
            CaseMode::Insensitive => fold_case(normalized_text).contains(&self.text),
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Split a newline-separated input into trimmed, non-empty entries
pub fn parse_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize("Opening   Balance\n\t-$1"), "Opening Balance -$1");
    }

    #[test]
    fn test_normalize_keeps_edges_as_single_space() {
        assert_eq!(normalize("  a  "), " a ");
    }

    #[test]
    fn test_match_key_insensitive_folds() {
        let key = MatchKey::new("Customer  ID", CaseMode::Insensitive);
        assert_eq!(key.as_str(), "customer id");
        assert!(key.is_in("the CUSTOMER ID is"));
    }

    #[test]
    fn test_match_key_sensitive_does_not_fold() {
        let key = MatchKey::new("Invoice", CaseMode::Sensitive);
        assert!(!key.is_in("invoice 42"));
        assert!(key.is_in("Invoice 42"));
    }

    #[test]
    fn test_equivalent_keywords_share_key() {
        let a = MatchKey::new("ACME\n Corp", CaseMode::Insensitive);
        let b = MatchKey::new("acme corp", CaseMode::Insensitive);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_lines_drops_blanks() {
        assert_eq!(parse_lines(" a \n\n  \nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_match_keys_deduplicate_in_hash_set() {
        let keys: HashSet<MatchKey> = ["ACME Corp", "acme  corp", "Globex"]
            .iter()
            .map(|k| MatchKey::new(k, CaseMode::Insensitive))
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&MatchKey::new("GLOBEX", CaseMode::Insensitive)));
    }
}
