//! Store statistics and upload history.
//!
//! Used by `clarion stats`, `clarion uploads` and `GET /stats`.

use anyhow::Result;
use serde::Serialize;

use clarion_core::filter::{FilterOptions, RecordStats};
use clarion_core::models::UploadRecord;
use clarion_core::store::RecordStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Statistics plus the distinct values available for filtering.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    #[serde(flatten)]
    pub stats: RecordStats,
    pub filter_options: FilterOptions,
}

pub async fn collect_stats(store: &dyn RecordStore) -> Result<StatsReport> {
    let records = store.all_records().await?;
    let uploads = store.list_uploads().await?;
    Ok(StatsReport {
        stats: RecordStats::compute(&records, &uploads),
        filter_options: FilterOptions::from_records(&records),
    })
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let report = collect_stats(&store).await;
    store.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let stats = &report.stats;

    println!("Clarion Store Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Records:     {}", stats.total);
    println!("  Open:        {}", stats.open_count);
    println!("  Resolved:    {}", stats.resolved_count);

    for (title, counts) in [
        ("By status", &stats.by_status),
        ("By priority", &stats.by_priority),
        ("By module", &stats.by_module),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!();
        println!("  {}:", title);
        for (value, count) in counts {
            println!("    {:<28} {:>6}", value, count);
        }
    }

    if !stats.recent_uploads.is_empty() {
        println!();
        println!("  Recent uploads:");
        print_uploads(&stats.recent_uploads);
    }
    println!();
    Ok(())
}

/// Run the uploads command: print the full upload history, newest first.
pub async fn run_uploads(config: &Config, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let uploads = store.list_uploads().await;
    store.close().await;
    let uploads = uploads?;

    if json {
        println!("{}", serde_json::to_string_pretty(&uploads)?);
        return Ok(());
    }
    if uploads.is_empty() {
        println!("No uploads.");
        return Ok(());
    }
    print_uploads(&uploads);
    Ok(())
}

fn print_uploads(uploads: &[UploadRecord]) {
    println!(
        "    {:<17} {:<28} {:>6} {:>6} {:>6} {:>6}",
        "UPLOADED", "FILE", "ROWS", "ADDED", "DUPES", "FAILED"
    );
    for u in uploads {
        println!(
            "    {:<17} {:<28} {:>6} {:>6} {:>6} {:>6}",
            u.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
            u.filename.chars().take(28).collect::<String>(),
            u.total_rows_in_file,
            u.added_count,
            u.duplicates_skipped,
            u.failed_rows
        );
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
