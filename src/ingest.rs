//! Batch upload of a spreadsheet export.
//!
//! Parses the file at the import boundary, then hands the drafts to the
//! deduplicating orchestrator in `clarion-core`. Rows already stored are
//! skipped, never updated.

use anyhow::Result;
use std::path::Path;
use uuid::Uuid;

use clarion_core::ingest::{ingest_batch, BatchSource};
use clarion_core::models::IngestSummary;
use clarion_core::store::RecordStore;

use crate::config::Config;
use crate::import::{self, ParsedSheet};
use crate::sqlite_store::SqliteStore;

/// Ingest an already parsed sheet under a fresh upload id.
pub async fn ingest_parsed(
    store: &dyn RecordStore,
    config: &Config,
    parsed: ParsedSheet,
    filename: &str,
) -> Result<IngestSummary> {
    let upload_id = Uuid::new_v4().to_string();
    let source = BatchSource {
        filename: filename.to_string(),
        sheet_name: parsed.sheet_name,
        rejected: parsed.rejected,
        row_numbers: parsed.row_numbers,
    };
    ingest_batch(
        store,
        parsed.drafts,
        &source,
        &upload_id,
        &config.ingest.keyword_sources(),
    )
    .await
}

/// CLI entry point for `clarion upload`.
pub async fn run_upload(config: &Config, path: &Path, sheet: Option<&str>) -> Result<()> {
    let parsed = import::parse_file(path, sheet.unwrap_or(import::REQUIRED_SHEET))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let store = SqliteStore::open(config).await?;
    let summary = ingest_parsed(&store, config, parsed, &filename).await;
    store.close().await;
    let summary = summary?;

    println!("upload {}", filename);
    println!("  rows in file: {}", summary.total_rows_in_batch);
    println!("  added: {}", summary.added_count);
    println!("  duplicates skipped: {}", summary.duplicates_skipped);
    println!("  failed: {}", summary.failed_rows);
    for err in &summary.errors {
        println!("    row {}: {}", err.row, err.message);
    }
    println!("  total records: {}", summary.total_rows_now_in_store);
    println!("  upload id: {}", summary.upload_id);
    if summary.aborted {
        println!("aborted: store became unavailable");
        anyhow::bail!("upload aborted after {} rows", summary.added_count + summary.duplicates_skipped);
    }
    println!("ok");
    Ok(())
}
