//! Opening/closing balance scanner
//!
//! Finds `Opening Balance -$1,234.56` style fields on each page and flags
//! pages whose value is negative.

use crate::error::SiftError;
use crate::locate::normalized_page_text;
use crate::progress::{progress_message, ProgressSink};
use crate::text::PageTextSource;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::{debug, info};

lazy_static! {
    static ref OPENING_BALANCE: Regex = field_pattern("Opening Balance");
    static ref CLOSING_BALANCE: Regex = field_pattern("Closing Balance");
}

fn field_pattern(label: &str) -> Regex {
    Regex::new(&format!(
        r"{}\s+(-?)\$(-?)(\d{{1,3}}(?:,\d{{3}})*|\d+)\.(\d{{2}})",
        regex::escape(label)
    ))
    .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceLabel {
    OpeningBalance,
    ClosingBalance,
}

impl BalanceLabel {
    pub fn label(self) -> &'static str {
        match self {
            BalanceLabel::OpeningBalance => "Opening Balance",
            BalanceLabel::ClosingBalance => "Closing Balance",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            BalanceLabel::OpeningBalance => &OPENING_BALANCE,
            BalanceLabel::ClosingBalance => &CLOSING_BALANCE,
        }
    }
}

/// Exact monetary amount in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One balance field found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancialField {
    pub label: BalanceLabel,
    pub page: u32,
    pub value: Amount,
}

/// First `label` field in already-normalized page text.
///
/// Returns None when the label is absent or the amount does not fit in cents.
pub fn find_field(label: BalanceLabel, normalized_text: &str) -> Option<Amount> {
    let caps = label.pattern().captures(normalized_text)?;
    parse_amount(&caps)
}

fn parse_amount(caps: &Captures<'_>) -> Option<Amount> {
    let negative = !caps[1].is_empty() || !caps[2].is_empty();
    let whole: i64 = caps[3].replace(',', "").parse().ok()?;
    let fraction: i64 = caps[4].parse().ok()?;
    let cents = whole.checked_mul(100)?.checked_add(fraction)?;
    Some(Amount(if negative { -cents } else { cents }))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceScan {
    pub opening: Vec<FinancialField>,
    pub closing: Vec<FinancialField>,
    /// Pages whose opening balance is negative
    pub negative_opening: Vec<u32>,
    /// Pages whose closing balance is negative
    pub negative_closing: Vec<u32>,
    pub page_count: u32,
}

impl BalanceScan {
    fn record(&mut self, field: FinancialField) {
        let negative = field.value.is_negative();
        let (fields, flagged) = match field.label {
            BalanceLabel::OpeningBalance => (&mut self.opening, &mut self.negative_opening),
            BalanceLabel::ClosingBalance => (&mut self.closing, &mut self.negative_closing),
        };
        if negative {
            flagged.push(field.page);
        }
        fields.push(field);
    }

    pub fn has_negative(&self) -> bool {
        !self.negative_opening.is_empty() || !self.negative_closing.is_empty()
    }
}

/// Scan every page for opening and closing balances
pub fn scan_balances<S: PageTextSource + ?Sized>(
    source: &S,
    progress: &mut dyn ProgressSink,
) -> Result<BalanceScan, SiftError> {
    let total = source.page_count()?;
    let mut scan = BalanceScan {
        page_count: total as u32,
        ..Default::default()
    };

    for page in 1..=total as u32 {
        let text = normalized_page_text(source, page)?;
        for label in [BalanceLabel::OpeningBalance, BalanceLabel::ClosingBalance] {
            if let Some(value) = find_field(label, &text) {
                debug!(page, label = label.label(), %value, "Balance field");
                scan.record(FinancialField { label, page, value });
            }
        }
        let current = page as usize;
        progress.report(current, total, &progress_message(current, total));
    }

    info!(
        pages = scan.page_count,
        negative_opening = scan.negative_opening.len(),
        negative_closing = scan.negative_closing.len(),
        "Balance scan complete"
    );

    Ok(scan)
}
