use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables and indexes. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            s_no INTEGER,
            module TEXT NOT NULL DEFAULT '',
            scenario_steps TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            offshore_comments TEXT NOT NULL DEFAULT '',
            onsite_comments TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL DEFAULT '',
            tester TEXT NOT NULL DEFAULT '',
            offshore_reviewer TEXT NOT NULL DEFAULT '',
            open TEXT NOT NULL DEFAULT '',
            addressed_by TEXT NOT NULL DEFAULT '',
            defect_should_be_raised TEXT NOT NULL DEFAULT '',
            priority TEXT NOT NULL DEFAULT '',
            assigned_to TEXT NOT NULL DEFAULT '',
            reason TEXT NOT NULL DEFAULT '',
            keywords TEXT NOT NULL DEFAULT '',
            row_hash TEXT NOT NULL UNIQUE,
            first_seen_at INTEGER NOT NULL,
            source_upload_id TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create uploads table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploads (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            sheet_name TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            total_rows_in_file INTEGER NOT NULL,
            added_count INTEGER NOT NULL,
            duplicates_skipped INTEGER NOT NULL,
            failed_rows INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    for (name, column) in [
        ("idx_records_status", "status"),
        ("idx_records_priority", "priority"),
        ("idx_records_module", "module"),
        ("idx_records_date", "date"),
    ] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON records({})",
            name, column
        ))
        .execute(pool)
        .await?;
    }
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_uploads_uploaded_at ON uploads(uploaded_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
