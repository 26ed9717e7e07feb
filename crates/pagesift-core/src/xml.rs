//! XML record validation and control-character repair
//!
//! Records are the `row` elements of a document, or the root's element
//! children when there are none. The repairer re-parses after every fix and
//! either returns fully repaired text or nothing.

use crate::config::RepairConfig;
use crate::error::SiftError;
use serde::Serialize;
use tracing::{debug, info, warn};

const CONTEXT_CHARS: usize = 20;
const SWEEP_CONTEXT: &str = "Batch removal of all control characters";

/// Control characters that XML 1.0 and spreadsheet cells reject
pub fn is_disallowed_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

fn parse_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Field values of one record, in first-appearance order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Set a field; a repeated name overwrites the earlier value in place
    pub fn set(&mut self, name: &str, value: String) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordTable {
    /// Union of field names across records, first appearance first
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordTable {
    fn push(&mut self, record: Record) {
        for (name, _) in record.fields() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Disallowed characters found in one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidCharacterRecord {
    /// 1-based
    pub row: usize,
    pub column: String,
    pub codepoints: Vec<u32>,
}

impl InvalidCharacterRecord {
    /// "0x0B, 0x1F"
    pub fn hex_list(&self) -> String {
        self.codepoints
            .iter()
            .map(|c| format!("0x{:02X}", c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedRecords {
    pub table: RecordTable,
    pub invalid: Vec<InvalidCharacterRecord>,
}

fn node_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Parse `text` into records and report disallowed characters per field
pub fn parse_records(text: &str) -> Result<ParsedRecords, SiftError> {
    let doc = roxmltree::Document::parse_with_options(text, parse_options())
        .map_err(|e| SiftError::XmlParse(e.to_string()))?;

    let mut rows: Vec<roxmltree::Node<'_, '_>> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "row")
        .collect();
    if rows.is_empty() {
        rows = doc.root_element().children().filter(|n| n.is_element()).collect();
    }

    let mut parsed = ParsedRecords::default();
    for (index, row) in rows.iter().enumerate() {
        let mut record = Record::default();
        for (cell_index, cell) in row.children().filter(|n| n.is_element()).enumerate() {
            let name = match cell.tag_name().name() {
                "" => format!("col{}", cell_index),
                name => name.to_string(),
            };
            let value = node_text(cell).trim().to_string();
            let codepoints: Vec<u32> = value
                .chars()
                .filter(|&c| is_disallowed_control(c))
                .map(u32::from)
                .collect();
            if !codepoints.is_empty() {
                parsed.invalid.push(InvalidCharacterRecord {
                    row: index + 1,
                    column: name.clone(),
                    codepoints,
                });
            }
            record.set(&name, value);
        }
        parsed.table.push(record);
    }

    debug!(
        records = parsed.table.len(),
        invalid = parsed.invalid.len(),
        "Parsed XML records"
    );
    Ok(parsed)
}

/// One removal made by the repairer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixRecord {
    pub attempt: u32,
    pub codepoint: u32,
    /// "0xB"
    pub hex: String,
    /// Char offset in the text at the time of removal
    pub position: usize,
    pub context: String,
}

impl FixRecord {
    fn new(attempt: u32, c: char, position: usize, context: String) -> Self {
        let codepoint = u32::from(c);
        Self {
            attempt,
            codepoint,
            hex: format!("0x{:X}", codepoint),
            position,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseFault {
    /// The parser named the offending character
    InvalidChar { ch: char, message: String },
    Other(String),
}

impl ParseFault {
    fn message(&self) -> &str {
        match self {
            ParseFault::InvalidChar { message, .. } | ParseFault::Other(message) => message,
        }
    }
}

fn parse_attempt(text: &str) -> Result<(), ParseFault> {
    match roxmltree::Document::parse_with_options(text, parse_options()) {
        Ok(_) => match text.chars().find(|&c| is_disallowed_control(c)) {
            Some(ch) => Err(ParseFault::InvalidChar {
                ch,
                message: format!("Char value {} is not allowed", u32::from(ch)),
            }),
            None => Ok(()),
        },
        Err(roxmltree::Error::NonXmlChar(ch, pos)) => Err(ParseFault::InvalidChar {
            ch,
            message: format!("Char value {} at {}", u32::from(ch), pos),
        }),
        Err(e) => Err(ParseFault::Other(e.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    Parsing,
    ErrorFound,
    Fixed,
    Failed(String),
}

/// Parse-and-fix loop over one document
#[derive(Debug, Clone)]
pub struct XmlRepairer {
    text: String,
    state: RepairState,
    attempts: u32,
    fixes: Vec<FixRecord>,
    max_attempts: u32,
    max_fixes: usize,
    fault: Option<ParseFault>,
}

impl XmlRepairer {
    pub fn new(text: &str, config: &RepairConfig) -> Self {
        Self {
            text: text.to_string(),
            state: RepairState::Parsing,
            attempts: 0,
            fixes: Vec::new(),
            max_attempts: config.max_attempts,
            max_fixes: config.max_fixes,
            fault: None,
        }
    }

    pub fn state(&self) -> &RepairState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn fixes(&self) -> &[FixRecord] {
        &self.fixes
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, RepairState::Fixed | RepairState::Failed(_))
    }

    /// Advance one transition
    pub fn step(&mut self) {
        match self.state {
            RepairState::Parsing => self.parse(),
            RepairState::ErrorFound => self.fix(),
            RepairState::Fixed | RepairState::Failed(_) => {}
        }
    }

    fn parse(&mut self) {
        self.attempts += 1;
        match parse_attempt(&self.text) {
            Ok(()) => self.state = RepairState::Fixed,
            Err(fault) => {
                debug!(attempt = self.attempts, error = fault.message(), "XML parse failed");
                if self.attempts >= self.max_attempts {
                    self.state = RepairState::Failed(format!(
                        "Could not fix XML after {} attempts. File may have too many invalid characters.",
                        self.max_attempts
                    ));
                } else {
                    self.fault = Some(fault);
                    self.state = RepairState::ErrorFound;
                }
            }
        }
    }

    fn fix(&mut self) {
        let removed = match self.fault.take() {
            Some(ParseFault::InvalidChar { ch, message }) => {
                if self.remove_first(ch) {
                    Ok(())
                } else if self.sweep() {
                    Ok(())
                } else {
                    Err(format!(
                        "Could not identify and remove invalid character. Error: {}",
                        message
                    ))
                }
            }
            Some(ParseFault::Other(message)) => {
                if self.sweep() {
                    Ok(())
                } else {
                    Err(format!("Could not fix XML. Error: {}", message))
                }
            }
            None => Err("No parse error to fix".to_string()),
        };

        self.state = match removed {
            Err(reason) => RepairState::Failed(reason),
            Ok(()) if self.fixes.len() > self.max_fixes => RepairState::Failed(format!(
                "Too many invalid characters found (>{}). XML file may be severely corrupted.",
                self.max_fixes
            )),
            Ok(()) => RepairState::Parsing,
        };
    }

    /// Remove the first occurrence of `ch`, logging its surroundings
    fn remove_first(&mut self, ch: char) -> bool {
        let Some((byte_pos, _)) = self.text.char_indices().find(|&(_, c)| c == ch) else {
            return false;
        };
        let position = self.text[..byte_pos].chars().count();
        let context: String = self
            .text
            .chars()
            .skip(position.saturating_sub(CONTEXT_CHARS))
            .take(position.min(CONTEXT_CHARS) + CONTEXT_CHARS)
            .collect();

        debug!(codepoint = u32::from(ch), position, "Removing invalid character");
        self.fixes
            .push(FixRecord::new(self.attempts, ch, position, context));
        self.text.replace_range(byte_pos..byte_pos + ch.len_utf8(), "");
        true
    }

    /// Remove every disallowed character, one fix record per distinct character
    fn sweep(&mut self) -> bool {
        let mut seen: Vec<char> = Vec::new();
        for (position, c) in self.text.chars().enumerate() {
            if is_disallowed_control(c) && !seen.contains(&c) {
                seen.push(c);
                self.fixes.push(FixRecord::new(
                    self.attempts,
                    c,
                    position,
                    SWEEP_CONTEXT.to_string(),
                ));
            }
        }
        if seen.is_empty() {
            return false;
        }
        debug!(distinct = seen.len(), "Swept control characters");
        self.text.retain(|c| !is_disallowed_control(c));
        true
    }

    /// Run to a terminal state
    pub fn run(mut self) -> Result<RepairOutcome, SiftError> {
        while !self.is_done() {
            self.step();
        }

        match self.state {
            RepairState::Fixed => {
                let parsed = parse_records(&self.text)?;
                info!(
                    attempts = self.attempts,
                    fixes = self.fixes.len(),
                    records = parsed.table.len(),
                    "XML repaired"
                );
                Ok(RepairOutcome {
                    text: self.text,
                    attempts: self.attempts,
                    fixes: self.fixes,
                    records: parsed.table,
                    invalid: parsed.invalid,
                })
            }
            RepairState::Failed(reason) => {
                warn!(
                    attempts = self.attempts,
                    fixes = self.fixes.len(),
                    %reason,
                    "XML repair failed"
                );
                Err(SiftError::XmlRepair {
                    attempts: self.attempts,
                    fixes: self.fixes.len(),
                    reason,
                })
            }
            RepairState::Parsing | RepairState::ErrorFound => Err(SiftError::XmlRepair {
                attempts: self.attempts,
                fixes: self.fixes.len(),
                reason: "Repair stopped before completion".into(),
            }),
        }
    }
}

/// Fully repaired document
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub text: String,
    pub attempts: u32,
    pub fixes: Vec<FixRecord>,
    pub records: RecordTable,
    /// Disallowed characters still present in field values
    pub invalid: Vec<InvalidCharacterRecord>,
}

pub fn repair_xml(text: &str, config: &RepairConfig) -> Result<RepairOutcome, SiftError> {
    XmlRepairer::new(text, config).run()
}

/// "data.xml" -> "data_fixed.xml"
pub fn fixed_file_name(name: &str) -> String {
    let stem = match name.len().checked_sub(4) {
        Some(split)
            if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".xml") =>
        {
            &name[..split]
        }
        _ => name,
    };
    format!("{}_fixed.xml", stem)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn control_char() -> impl Strategy<Value = char> {
        prop_oneof![
            (0x01u32..=0x08).prop_map(|c| char::from_u32(c).unwrap_or('\u{01}')),
            Just('\u{0B}'),
            Just('\u{0C}'),
            (0x0Eu32..=0x1F).prop_map(|c| char::from_u32(c).unwrap_or('\u{0E}')),
        ]
    }

    proptest! {
        /// Property: repair ends Fixed with clean text, or Failed within the ceilings
        #[test]
        fn repair_terminates_within_ceilings(
            body in prop::collection::vec(prop_oneof![
                3 => "[a-z ]".prop_map(|s| s.chars().next().unwrap_or('a')),
                1 => control_char(),
            ], 0..40),
        ) {
            let value: String = body.into_iter().collect();
            let xml = format!("<r><row><v>{}</v></row></r>", value);
            let config = RepairConfig::default();

            match repair_xml(&xml, &config) {
                Ok(outcome) => {
                    prop_assert!(outcome.attempts <= config.max_attempts);
                    prop_assert!(!outcome.text.chars().any(is_disallowed_control));
                    prop_assert!(outcome.fixes.len() <= config.max_fixes);
                }
                Err(SiftError::XmlRepair { attempts, .. }) => {
                    prop_assert!(attempts <= config.max_attempts);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}
