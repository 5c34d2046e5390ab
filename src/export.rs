//! CSV export of stored records.
//!
//! Columns follow spreadsheet order with the sheet's header labels, so an
//! export maps back onto the same fields on import. Dates are written in
//! display form (`05-Mar-2024`). The output starts with a UTF-8 byte order
//! mark so spreadsheet tools detect the encoding.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::io::Write;
use std::path::Path;

use clarion_core::filter::RecordFilter;
use clarion_core::models::{Record, RecordField};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use clarion_core::store::RecordStore;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Exported columns. Derived keywords are left out.
pub fn export_fields() -> impl Iterator<Item = RecordField> {
    RecordField::ALL
        .into_iter()
        .filter(|f| *f != RecordField::Keywords)
}

/// `2024-03-05` becomes `05-Mar-2024`. Anything else is kept as-is.
pub fn format_display_date(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d.format("%d-%b-%Y").to_string(),
        Err(_) => date.to_string(),
    }
}

fn cell(record: &Record, field: RecordField) -> String {
    match field {
        RecordField::Date => format_display_date(&record.date),
        other => record.text(other).into_owned(),
    }
}

/// Write `records` as CSV to `out`.
pub fn write_csv<W: Write>(mut out: W, records: &[Record]) -> Result<()> {
    out.write_all(UTF8_BOM)?;
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(export_fields().map(|f| f.label()))?;
    for record in records {
        writer.write_record(export_fields().map(|f| cell(record, f)))?;
    }
    writer.flush()?;
    Ok(())
}

/// CSV bytes for `records`, as served by `GET /export`.
pub fn to_csv_bytes(records: &[Record]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(&mut buf, records)?;
    Ok(buf)
}

/// CLI entry point for `clarion export`. Writes to `out`, or stdout when
/// no path is given.
pub async fn run_export(config: &Config, filter: &RecordFilter, out: Option<&Path>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.all_records().await;
    store.close().await;
    let records = filter.apply(records?);

    match out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create export file: {}", path.display()))?;
            write_csv(std::io::BufWriter::new(file), &records)?;
            println!("exported {} records to {}", records.len(), path.display());
        }
        None => write_csv(std::io::stdout().lock(), &records)?,
    }
    Ok(())
}
