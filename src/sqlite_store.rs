//! SQLite-backed [`RecordStore`] implementation.
//!
//! Content-hash uniqueness is enforced by the `UNIQUE` constraint on
//! `records.row_hash`; a violation surfaces as
//! [`StoreError::DuplicateHash`]. Timestamps are stored as Unix
//! milliseconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use clarion_core::models::{Record, UploadRecord};
use clarion_core::store::{RecordStore, StoreError, StoreResult};

use crate::config::Config;
use crate::{db, migrate};

const RECORD_COLUMNS: &str = "id, s_no, module, scenario_steps, status, offshore_comments, \
    onsite_comments, date, tester, offshore_reviewer, open, addressed_by, \
    defect_should_be_raised, priority, assigned_to, reason, keywords, row_hash, \
    first_seen_at, source_upload_id";

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Classify a sqlx error for the orchestrator.
fn classify(err: sqlx::Error, row_hash: Option<&str>) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation() && db_err.message().contains("row_hash") =>
        {
            StoreError::DuplicateHash(row_hash.unwrap_or_default().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(anyhow::Error::new(err)),
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    classify(err, None)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn record_from_row(row: &SqliteRow) -> sqlx::Result<Record> {
    Ok(Record {
        id: row.try_get("id")?,
        s_no: row.try_get("s_no")?,
        module: row.try_get("module")?,
        scenario_steps: row.try_get("scenario_steps")?,
        status: row.try_get("status")?,
        offshore_comments: row.try_get("offshore_comments")?,
        onsite_comments: row.try_get("onsite_comments")?,
        date: row.try_get("date")?,
        tester: row.try_get("tester")?,
        offshore_reviewer: row.try_get("offshore_reviewer")?,
        open: row.try_get("open")?,
        addressed_by: row.try_get("addressed_by")?,
        defect_should_be_raised: row.try_get("defect_should_be_raised")?,
        priority: row.try_get("priority")?,
        assigned_to: row.try_get("assigned_to")?,
        reason: row.try_get("reason")?,
        keywords: row.try_get("keywords")?,
        row_hash: row.try_get("row_hash")?,
        first_seen_at: from_millis(row.try_get("first_seen_at")?),
        source_upload_id: row.try_get("source_upload_id")?,
    })
}

fn upload_from_row(row: &SqliteRow) -> sqlx::Result<UploadRecord> {
    Ok(UploadRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        sheet_name: row.try_get("sheet_name")?,
        uploaded_at: from_millis(row.try_get("uploaded_at")?),
        total_rows_in_file: row.try_get::<i64, _>("total_rows_in_file")? as u64,
        added_count: row.try_get::<i64, _>("added_count")? as u64,
        duplicates_skipped: row.try_get::<i64, _>("duplicates_skipped")? as u64,
        failed_rows: row.try_get::<i64, _>("failed_rows")? as u64,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_record(&self, record: &Record) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO records (id, s_no, module, scenario_steps, status, offshore_comments,
                                 onsite_comments, date, tester, offshore_reviewer, open,
                                 addressed_by, defect_should_be_raised, priority, assigned_to,
                                 reason, keywords, row_hash, first_seen_at, source_upload_id,
                                 updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.s_no)
        .bind(&record.module)
        .bind(&record.scenario_steps)
        .bind(&record.status)
        .bind(&record.offshore_comments)
        .bind(&record.onsite_comments)
        .bind(&record.date)
        .bind(&record.tester)
        .bind(&record.offshore_reviewer)
        .bind(&record.open)
        .bind(&record.addressed_by)
        .bind(&record.defect_should_be_raised)
        .bind(&record.priority)
        .bind(&record.assigned_to)
        .bind(&record.reason)
        .bind(&record.keywords)
        .bind(&record.row_hash)
        .bind(record.first_seen_at.timestamp_millis())
        .bind(&record.source_upload_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, Some(&record.row_hash)))?;
        Ok(())
    }

    async fn find_by_hash(&self, row_hash: &str) -> StoreResult<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM records WHERE row_hash = ?",
            RECORD_COLUMNS
        ))
        .bind(row_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(record_from_row).transpose().map_err(backend)
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<Record>> {
        let row = sqlx::query(&format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(record_from_row).transpose().map_err(backend)
    }

    async fn update_record(&self, record: &Record) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE records SET
                s_no = ?, module = ?, scenario_steps = ?, status = ?,
                offshore_comments = ?, onsite_comments = ?, date = ?, tester = ?,
                offshore_reviewer = ?, open = ?, addressed_by = ?,
                defect_should_be_raised = ?, priority = ?, assigned_to = ?, reason = ?,
                keywords = ?, row_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.s_no)
        .bind(&record.module)
        .bind(&record.scenario_steps)
        .bind(&record.status)
        .bind(&record.offshore_comments)
        .bind(&record.onsite_comments)
        .bind(&record.date)
        .bind(&record.tester)
        .bind(&record.offshore_reviewer)
        .bind(&record.open)
        .bind(&record.addressed_by)
        .bind(&record.defect_should_be_raised)
        .bind(&record.priority)
        .bind(&record.assigned_to)
        .bind(&record.reason)
        .bind(&record.keywords)
        .bind(&record.row_hash)
        .bind(now)
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, Some(&record.row_hash)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id.clone()));
        }
        Ok(())
    }

    async fn all_records(&self) -> StoreResult<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records ORDER BY rowid ASC",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(record_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(backend)
    }

    async fn count_records(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }

    async fn record_upload(&self, upload: &UploadRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (id, filename, sheet_name, uploaded_at, total_rows_in_file,
                                 added_count, duplicates_skipped, failed_rows)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.id)
        .bind(&upload.filename)
        .bind(&upload.sheet_name)
        .bind(upload.uploaded_at.timestamp_millis())
        .bind(upload.total_rows_in_file as i64)
        .bind(upload.added_count as i64)
        .bind(upload.duplicates_skipped as i64)
        .bind(upload.failed_rows as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn list_uploads(&self) -> StoreResult<Vec<UploadRecord>> {
        let rows = sqlx::query(
            "SELECT id, filename, sheet_name, uploaded_at, total_rows_in_file, added_count, \
             duplicates_skipped, failed_rows FROM uploads ORDER BY uploaded_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(upload_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use chrono::Duration;
    use clarion_core::ingest::{ingest_batch, prepare_record, BatchSource};
    use clarion_core::keywords::KeywordSources;
    use clarion_core::models::RecordDraft;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let cfg = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("data/clarion.sqlite").display()
        ))
        .unwrap();
        let store = SqliteStore::open(&cfg).await.unwrap();
        (tmp, store)
    }

    fn draft(scenario: &str) -> RecordDraft {
        RecordDraft {
            s_no: Some(4),
            module: "Signals".into(),
            scenario_steps: scenario.into(),
            status: "Open".into(),
            priority: "P1".into(),
            ..Default::default()
        }
    }

    fn record(scenario: &str) -> Record {
        prepare_record(draft(scenario), &KeywordSources::default(), Utc::now(), None)
    }

    #[tokio::test]
    async fn test_round_trip_and_duplicate_hash() {
        let (_tmp, store) = open_store().await;
        let r = record("Train halts at signal 12");
        store.insert_record(&r).await.unwrap();

        let fetched = store.get_record(&r.id).await.unwrap().unwrap();
        assert_eq!(fetched.scenario_steps, r.scenario_steps);
        assert_eq!(fetched.s_no, Some(4));
        assert_eq!(fetched.row_hash, r.row_hash);
        assert_eq!(
            fetched.first_seen_at.timestamp_millis(),
            r.first_seen_at.timestamp_millis()
        );

        let mut twin = r.clone();
        twin.id = "another-id".into();
        let err = store.insert_record(&twin).await.unwrap_err();
        assert!(err.is_duplicate(), "got {:?}", err);
        assert_eq!(store.count_records().await.unwrap(), 1);
        assert!(store.find_by_hash(&r.row_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_semantics() {
        let (_tmp, store) = open_store().await;
        let a = record("Door fails to close");
        let b = record("Brake test pending");
        store.insert_record(&a).await.unwrap();
        store.insert_record(&b).await.unwrap();

        let mut edited = a.clone();
        edited.status = "Closed".into();
        edited.row_hash = "f".repeat(64);
        edited.first_seen_at = a.first_seen_at + Duration::days(2);
        store.update_record(&edited).await.unwrap();
        let stored = store.get_record(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "Closed");
        assert_eq!(
            stored.first_seen_at.timestamp_millis(),
            a.first_seen_at.timestamp_millis()
        );

        let mut clash = b.clone();
        clash.row_hash = edited.row_hash.clone();
        assert!(store.update_record(&clash).await.unwrap_err().is_duplicate());

        let mut ghost = a.clone();
        ghost.id = "ghost".into();
        ghost.row_hash = "0".repeat(64);
        assert!(matches!(
            store.update_record(&ghost).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_batch_ingest_against_sqlite() {
        let (_tmp, store) = open_store().await;
        let source = BatchSource {
            filename: "tracker.xlsx".into(),
            sheet_name: "clarification".into(),
            ..Default::default()
        };
        let drafts = vec![
            draft("Signal shows wrong aspect"),
            draft("Signal shows wrong aspect"),
            draft("Authority conflict near MP 12"),
        ];

        let first = ingest_batch(&store, drafts.clone(), &source, "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(first.added_count, 2);
        assert_eq!(first.duplicates_skipped, 1);
        assert_eq!(first.total_rows_now_in_store, 2);

        let second = ingest_batch(&store, drafts, &source, "u2", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(second.added_count, 0);
        assert_eq!(second.duplicates_skipped, 3);
        assert_eq!(second.total_rows_now_in_store, 2);

        let uploads = store.list_uploads().await.unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].id, "u2");
        assert_eq!(uploads[1].added_count, 2);

        let all = store.all_records().await.unwrap();
        assert_eq!(all[0].scenario_steps, "Signal shows wrong aspect");
        assert_eq!(all[0].source_upload_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let (_tmp, store) = open_store().await;
        store.close().await;
        let err = store.count_records().await.unwrap_err();
        assert!(err.is_unavailable(), "got {:?}", err);
    }
}
