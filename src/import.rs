//! Spreadsheet export parsing.
//!
//! A batch file is JSON exported from the tracker workbook. Three shapes
//! are accepted:
//!
//! ```text
//! [ {"S.no": 1, "Module": "...", ...}, ... ]              rows only
//! { "sheet": "clarification", "rows": [ ... ] }           one named sheet
//! { "sheets": { "Clarification": [ ... ], "Notes": [] } }  whole workbook
//! ```
//!
//! Headers are mapped to record fields by exact label or column name
//! (case-insensitive), then by a table of common variations. Unknown
//! headers are ignored and logged once per file.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use clarion_core::models::{RecordDraft, RecordField, RowError};

/// Sheet name a workbook export must contain.
pub const REQUIRED_SHEET: &str = "clarification";

/// Substring patterns for header variations, checked in order.
const HEADER_VARIATIONS: &[(&str, RecordField)] = &[
    ("sno", RecordField::SNo),
    ("s no", RecordField::SNo),
    ("s.no", RecordField::SNo),
    ("serial", RecordField::SNo),
    ("scenario", RecordField::ScenarioSteps),
    ("steps", RecordField::ScenarioSteps),
    ("offshore comment", RecordField::OffshoreComments),
    ("onsite comment", RecordField::OnsiteComments),
    ("offshore review", RecordField::OffshoreReviewer),
    ("assigned", RecordField::AssignedTo),
    ("assignedto", RecordField::AssignedTo),
    ("defect", RecordField::DefectShouldBeRaised),
    ("addressed", RecordField::AddressedBy),
];

/// Result of parsing one batch file.
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub sheet_name: String,
    pub drafts: Vec<RecordDraft>,
    /// Position in the file of each draft.
    pub row_numbers: Vec<usize>,
    /// Rows that were not JSON objects, by position in the file.
    pub rejected: Vec<RowError>,
    pub unmapped_headers: Vec<String>,
}

/// Map a spreadsheet header to a record field.
pub fn map_header(header: &str) -> Option<RecordField> {
    let normalized = header.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let exact = RecordField::ALL.iter().copied().find(|f| {
        *f != RecordField::Keywords
            && (f.label().to_lowercase() == normalized || f.as_str() == normalized)
    });
    if exact.is_some() {
        return exact;
    }
    HEADER_VARIATIONS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map(|(_, field)| *field)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn parse_s_no(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '-')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Normalize a date cell to `YYYY-MM-DD` where it can be understood.
///
/// Numbers are spreadsheet serial days. Unrecognized text is kept as-is.
pub fn parse_date(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(serial) if serial > 0.0 => NaiveDate::from_ymd_opt(1899, 12, 30)
                .zip(TimeDelta::try_days(serial.trunc() as i64))
                .and_then(|(epoch, days)| epoch.checked_add_signed(days))
                .map(|date| date.to_string())
                .unwrap_or_else(|| n.to_string()),
            _ => n.to_string(),
        },
        Value::String(s) => {
            let s = s.trim();
            for format in ["%Y-%m-%d", "%d-%b-%Y", "%d %b %Y", "%d/%m/%Y", "%d-%m-%Y"] {
                if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                    return date.to_string();
                }
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return dt.date().to_string();
                }
            }
            s.to_string()
        }
        other => cell_text(other),
    }
}

/// Turn one row object into a draft. Unknown headers go to `unmapped`.
pub fn row_to_draft(row: &Map<String, Value>, unmapped: &mut BTreeSet<String>) -> RecordDraft {
    let mut draft = RecordDraft::default();
    for (header, value) in row {
        let Some(field) = map_header(header) else {
            unmapped.insert(header.clone());
            continue;
        };
        match field {
            RecordField::SNo => draft.s_no = parse_s_no(value),
            RecordField::Date => draft.date = parse_date(value),
            other => {
                if let Some(slot) = draft.text_mut(other) {
                    *slot = cell_text(value);
                }
            }
        }
    }
    draft
}

fn find_sheet<'a>(sheets: &'a Map<String, Value>, wanted: &str) -> Option<(&'a String, &'a Value)> {
    sheets.iter().find(|(name, _)| name.eq_ignore_ascii_case(wanted))
}

/// Parse an in-memory JSON document.
pub fn parse_document(doc: Value, required_sheet: &str) -> Result<ParsedSheet> {
    let (sheet_name, rows) = match doc {
        Value::Array(rows) => (required_sheet.to_string(), rows),
        Value::Object(mut obj) => {
            if let Some(Value::Object(sheets)) = obj.get("sheets") {
                let Some((name, rows)) = find_sheet(sheets, required_sheet) else {
                    let available: Vec<&str> = sheets.keys().map(|k| k.as_str()).collect();
                    bail!(
                        "Sheet \"{}\" not found. Available sheets: {}",
                        required_sheet,
                        available.join(", ")
                    );
                };
                match rows {
                    Value::Array(rows) => (name.clone(), rows.clone()),
                    _ => bail!("sheet \"{}\" must be an array of rows", name),
                }
            } else {
                let name = match obj.get("sheet") {
                    Some(Value::String(s)) => s.clone(),
                    _ => required_sheet.to_string(),
                };
                if !name.eq_ignore_ascii_case(required_sheet) {
                    bail!(
                        "Sheet \"{}\" not found. Available sheets: {}",
                        required_sheet,
                        name
                    );
                }
                match obj.remove("rows") {
                    Some(Value::Array(rows)) => (name, rows),
                    _ => bail!("expected a \"rows\" array"),
                }
            }
        }
        _ => bail!("expected a JSON array of rows or an object with \"rows\" or \"sheets\""),
    };

    let mut parsed = ParsedSheet {
        sheet_name,
        ..Default::default()
    };
    let mut unmapped = BTreeSet::new();
    for (idx, row) in rows.iter().enumerate() {
        match row {
            Value::Object(map) => {
                parsed.drafts.push(row_to_draft(map, &mut unmapped));
                parsed.row_numbers.push(idx);
            }
            other => parsed.rejected.push(RowError {
                row: idx,
                message: format!("row {} is not an object (found {})", idx, json_kind(other)),
            }),
        }
    }
    parsed.unmapped_headers = unmapped.into_iter().collect();

    if !parsed.unmapped_headers.is_empty() {
        warn!(headers = ?parsed.unmapped_headers, "ignoring unrecognized columns");
    }
    debug!(
        sheet = %parsed.sheet_name,
        rows = parsed.drafts.len(),
        rejected = parsed.rejected.len(),
        "sheet parsed"
    );
    Ok(parsed)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read and parse a batch file from disk.
pub fn parse_file(path: &Path, required_sheet: &str) -> Result<ParsedSheet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let doc: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file as JSON: {}", path.display()))?;
    parse_document(doc, required_sheet)
}
