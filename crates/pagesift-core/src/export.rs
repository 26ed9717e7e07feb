//! Tabular export of parsed XML records
//!
//! Each sheet is rendered as CSV; `to_zip` packages them as `<sheet>.csv`.

use crate::archive::zip_entries;
use crate::error::SiftError;
use crate::xml::{FixRecord, InvalidCharacterRecord, Record, RecordTable};

pub const DATA_SHEET: &str = "Data";
pub const INVALID_SHEET: &str = "Invalid Characters";
pub const FIXES_SHEET: &str = "Fixes Applied";

/// Download name of the packaged export
pub const EXPORT_FILE_NAME: &str = "xml_export.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn to_csv(&self) -> Result<Vec<u8>, SiftError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| SiftError::SerializationError(e.to_string()))
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub struct XmlExport<'a> {
    records: &'a RecordTable,
    invalid: &'a [InvalidCharacterRecord],
    fixes: &'a [FixRecord],
}

impl<'a> XmlExport<'a> {
    pub fn new(
        records: &'a RecordTable,
        invalid: &'a [InvalidCharacterRecord],
        fixes: &'a [FixRecord],
    ) -> Self {
        Self {
            records,
            invalid,
            fixes,
        }
    }

    /// First `n` records for display
    pub fn preview(&self, n: usize) -> &'a [Record] {
        let end = n.min(self.records.records.len());
        &self.records.records[..end]
    }

    fn data_sheet(&self) -> Sheet {
        let columns = &self.records.columns;
        let rows = self
            .records
            .records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Sheet {
            name: DATA_SHEET,
            headers: columns.clone(),
            rows,
        }
    }

    fn invalid_sheet(&self) -> Sheet {
        Sheet {
            name: INVALID_SHEET,
            headers: headers(&["Row", "Column", "Invalid Characters (Hex)"]),
            rows: self
                .invalid
                .iter()
                .map(|r| vec![r.row.to_string(), r.column.clone(), r.hex_list()])
                .collect(),
        }
    }

    fn fixes_sheet(&self) -> Sheet {
        Sheet {
            name: FIXES_SHEET,
            headers: headers(&[
                "Attempt",
                "Char Code (Hex)",
                "Char Code (Dec)",
                "Position",
                "Context",
            ]),
            rows: self
                .fixes
                .iter()
                .map(|f| {
                    vec![
                        f.attempt.to_string(),
                        f.hex.clone(),
                        f.codepoint.to_string(),
                        f.position.to_string(),
                        f.context.clone(),
                    ]
                })
                .collect(),
        }
    }

    /// Data first; the other sheets only when they have rows
    pub fn sheets(&self) -> Vec<Sheet> {
        let mut sheets = vec![self.data_sheet()];
        for sheet in [self.invalid_sheet(), self.fixes_sheet()] {
            if !sheet.rows.is_empty() {
                sheets.push(sheet);
            }
        }
        sheets
    }

    pub fn to_zip(&self) -> Result<Vec<u8>, SiftError> {
        let rendered = self
            .sheets()
            .iter()
            .map(|sheet| Ok((sheet.file_name(), sheet.to_csv()?)))
            .collect::<Result<Vec<_>, SiftError>>()?;
        zip_entries(
            rendered
                .iter()
                .map(|(name, bytes)| (name.clone(), bytes.as_slice())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepairConfig;
    use crate::xml::{parse_records, repair_xml};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn test_data_sheet_uses_column_union() {
        let parsed =
            parse_records("<r><row><a>1</a></row><row><b>x,y</b><a>2</a></row></r>").unwrap();
        let export = XmlExport::new(&parsed.table, &parsed.invalid, &[]);
        let sheets = export.sheets();

        assert_eq!(sheets.len(), 1);
        let csv = String::from_utf8(sheets[0].to_csv().unwrap()).unwrap();
        assert_eq!(csv, "a,b\n1,\n2,\"x,y\"\n");
    }

    #[test]
    fn test_fixes_sheet_included_after_repair() {
        let outcome =
            repair_xml("<r><row><v>a\u{0B}b</v></row></r>", &RepairConfig::default()).unwrap();
        let export = XmlExport::new(&outcome.records, &outcome.invalid, &outcome.fixes);
        let sheets = export.sheets();

        let names: Vec<&str> = sheets.iter().map(|s| s.name).collect();
        assert_eq!(names, vec![DATA_SHEET, FIXES_SHEET]);
        assert_eq!(sheets[1].rows[0][..4], ["1", "0xB", "11", "12"]);
    }

    #[test]
    fn test_invalid_sheet_rows() {
        let table = RecordTable::default();
        let invalid = vec![InvalidCharacterRecord {
            row: 3,
            column: "name".into(),
            codepoints: vec![0x01, 0x1F],
        }];
        let export = XmlExport::new(&table, &invalid, &[]);
        let sheets = export.sheets();

        assert_eq!(sheets[1].name, INVALID_SHEET);
        assert_eq!(sheets[1].rows, vec![vec!["3", "name", "0x01, 0x1F"]]);
    }

    #[test]
    fn test_preview_is_bounded() {
        let parsed = parse_records("<r><row><a>1</a></row><row><a>2</a></row></r>").unwrap();
        let export = XmlExport::new(&parsed.table, &[], &[]);
        assert_eq!(export.preview(5).len(), 2);
        assert_eq!(export.preview(1)[0].get("a"), Some("1"));
    }

    #[test]
    fn test_zip_contains_csv_per_sheet() {
        let parsed = parse_records("<r><row><a>1</a></row></r>").unwrap();
        let export = XmlExport::new(&parsed.table, &[], &[]);
        let bytes = export.to_zip().unwrap();

        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 1);
        let mut content = String::new();
        zip.by_name("Data.csv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "a\n1\n");
    }
}
