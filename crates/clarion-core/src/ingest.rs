//! Ingestion and deduplication orchestration.
//!
//! Two entry points share one preparation step (keywords + row hash):
//!
//! - [`ingest_batch`] is append-only. A row whose hash is already stored is
//!   counted as a duplicate and the stored record is left untouched. A
//!   uniqueness violation raised by the store on insert (a concurrent
//!   writer got there first) is reclassified as a duplicate too.
//! - [`save_record`] creates or edits one record. Edits overwrite in place;
//!   creates are rejected with a duplicate flag under the configured
//!   [`DedupPolicy`].
//!
//! Per-row backend errors are collected and the batch continues; a store
//! that reports itself [`Unavailable`](StoreError::Unavailable) aborts the
//! rest of the batch, and the counts accumulated so far are returned.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hash::{normalize_text, row_hash, scenario_key};
use crate::keywords::KeywordSources;
use crate::models::{IngestSummary, Record, RecordDraft, RowError, SaveOutcome, UploadRecord};
use crate::store::{RecordStore, StoreError};

/// Duplicate policy for single-record creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Reject when the full canonical row hash already exists.
    #[default]
    ContentHash,
    /// Reject when a stored record has the same normalized scenario text.
    /// Drafts with an empty scenario fall back to the row hash.
    Scenario,
}

/// Where a batch came from, for the upload audit row.
#[derive(Debug, Clone, Default)]
pub struct BatchSource {
    pub filename: String,
    pub sheet_name: String,
    /// Rows the import boundary could not turn into drafts. They count as
    /// failed rows of the batch.
    pub rejected: Vec<RowError>,
    /// Position in the source file of each draft, parallel to the drafts.
    /// Drafts without an entry are numbered by their index in the batch.
    pub row_numbers: Vec<usize>,
}

impl BatchSource {
    fn row_number(&self, index: usize) -> usize {
        self.row_numbers.get(index).copied().unwrap_or(index)
    }
}

/// Derive keywords and row hash and assemble a storable record.
///
/// Keeps `draft.id` when present, otherwise assigns a fresh UUID.
pub fn prepare_record(
    draft: RecordDraft,
    sources: &KeywordSources,
    first_seen_at: DateTime<Utc>,
    source_upload_id: Option<String>,
) -> Record {
    let keywords = sources.keywords_for(&draft);
    let hash = row_hash(&draft);
    let id = draft
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Record::from_draft(draft, id, keywords, hash, first_seen_at, source_upload_id)
}

enum RowOutcome {
    Added,
    Duplicate,
    Failed(String),
    Abort(String),
}

async fn ingest_row<S: RecordStore + ?Sized>(store: &S, record: &Record) -> RowOutcome {
    match store.find_by_hash(&record.row_hash).await {
        Ok(Some(_)) => return RowOutcome::Duplicate,
        Ok(None) => {}
        Err(StoreError::Unavailable(msg)) => return RowOutcome::Abort(msg),
        Err(e) => return RowOutcome::Failed(e.to_string()),
    }

    match store.insert_record(record).await {
        Ok(()) => RowOutcome::Added,
        Err(StoreError::DuplicateHash(_)) => RowOutcome::Duplicate,
        Err(StoreError::Unavailable(msg)) => RowOutcome::Abort(msg),
        Err(e) => RowOutcome::Failed(e.to_string()),
    }
}

/// Ingest a batch of drafts, append-only against hash collisions.
///
/// Returns an error only if the store cannot be reached before the first
/// row is attempted. After that, the summary is always returned and the
/// upload audit row is written best-effort.
pub async fn ingest_batch<S: RecordStore + ?Sized>(
    store: &S,
    drafts: Vec<RecordDraft>,
    source: &BatchSource,
    upload_id: &str,
    sources: &KeywordSources,
) -> Result<IngestSummary> {
    let total_rows_in_batch = (drafts.len() + source.rejected.len()) as u64;
    let rows_before = store.count_records().await?;
    let now = Utc::now();

    let mut added_count = 0u64;
    let mut duplicates_skipped = 0u64;
    let mut errors: Vec<RowError> = source.rejected.clone();
    let mut aborted = false;

    for (index, draft) in drafts.into_iter().enumerate() {
        let row = source.row_number(index);
        let record = prepare_record(draft, sources, now, Some(upload_id.to_string()));
        match ingest_row(store, &record).await {
            RowOutcome::Added => added_count += 1,
            RowOutcome::Duplicate => {
                debug!(row, hash = %record.row_hash, "duplicate row skipped");
                duplicates_skipped += 1;
            }
            RowOutcome::Failed(message) => {
                warn!(row, error = %message, "row failed, continuing batch");
                errors.push(RowError { row, message });
            }
            RowOutcome::Abort(message) => {
                warn!(row, error = %message, "store unavailable, aborting batch");
                errors.push(RowError { row, message });
                aborted = true;
                break;
            }
        }
    }

    errors.sort_by_key(|e| e.row);

    let total_rows_now_in_store = match store.count_records().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "could not recount records after batch");
            rows_before + added_count
        }
    };

    let summary = IngestSummary {
        upload_id: upload_id.to_string(),
        added_count,
        duplicates_skipped,
        failed_rows: errors.len() as u64,
        total_rows_in_batch,
        total_rows_now_in_store,
        aborted,
        errors,
    };

    let upload = UploadRecord {
        id: upload_id.to_string(),
        filename: source.filename.clone(),
        sheet_name: source.sheet_name.clone(),
        uploaded_at: now,
        total_rows_in_file: total_rows_in_batch,
        added_count: summary.added_count,
        duplicates_skipped: summary.duplicates_skipped,
        failed_rows: summary.failed_rows,
    };
    if let Err(e) = store.record_upload(&upload).await {
        warn!(upload_id, error = %e, "failed to persist upload audit row");
    }

    info!(
        upload_id,
        filename = %source.filename,
        added = summary.added_count,
        duplicates = summary.duplicates_skipped,
        failed = summary.failed_rows,
        aborted = summary.aborted,
        "batch ingested"
    );

    Ok(summary)
}

async fn find_duplicate<S: RecordStore + ?Sized>(
    store: &S,
    record: &Record,
    draft_key: &str,
    policy: DedupPolicy,
) -> Result<bool, StoreError> {
    match policy {
        DedupPolicy::Scenario if !draft_key.is_empty() => {
            let existing = store.all_records().await?;
            Ok(existing
                .iter()
                .any(|r| normalize_text(&r.scenario_steps) == draft_key))
        }
        _ => Ok(store.find_by_hash(&record.row_hash).await?.is_some()),
    }
}

/// Create (no `id`) or edit (`id` present) a single record.
///
/// Never returns an error: duplicates and store failures are reported in
/// the [`SaveOutcome`].
pub async fn save_record<S: RecordStore + ?Sized>(
    store: &S,
    draft: RecordDraft,
    sources: &KeywordSources,
    policy: DedupPolicy,
) -> SaveOutcome {
    let is_edit = draft.id.is_some();
    let key = scenario_key(&draft);
    let record = prepare_record(draft, sources, Utc::now(), None);

    if is_edit {
        return match store.update_record(&record).await {
            Ok(()) => {
                info!(id = %record.id, hash = %record.row_hash, "record updated");
                SaveOutcome::saved(record.id)
            }
            Err(StoreError::DuplicateHash(_)) => {
                SaveOutcome::duplicate("another record already has identical content")
            }
            Err(StoreError::NotFound(id)) => SaveOutcome::failed(format!("record not found: {}", id)),
            Err(e) => SaveOutcome::failed(e.to_string()),
        };
    }

    match find_duplicate(store, &record, &key, policy).await {
        Ok(true) => {
            debug!(hash = %record.row_hash, ?policy, "create rejected as duplicate");
            return SaveOutcome::duplicate("a record with this content already exists");
        }
        Ok(false) => {}
        Err(e) => return SaveOutcome::failed(e.to_string()),
    }

    match store.insert_record(&record).await {
        Ok(()) => {
            info!(id = %record.id, hash = %record.row_hash, "record created");
            SaveOutcome::saved(record.id)
        }
        Err(StoreError::DuplicateHash(_)) => {
            SaveOutcome::duplicate("a record with this content already exists")
        }
        Err(e) => SaveOutcome::failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordField, UploadRecord};
    use crate::store::memory::InMemoryStore;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn draft(scenario: &str) -> RecordDraft {
        RecordDraft {
            module: "Signals".into(),
            scenario_steps: scenario.into(),
            status: "Open".into(),
            ..Default::default()
        }
    }

    fn source() -> BatchSource {
        BatchSource {
            filename: "clarifications.xlsx".into(),
            sheet_name: "clarification".into(),
            ..Default::default()
        }
    }

    fn batch(n: usize) -> Vec<RecordDraft> {
        (0..n).map(|i| draft(&format!("Scenario number {}", i))).collect()
    }

    #[tokio::test]
    async fn test_batch_is_idempotent() {
        let store = InMemoryStore::new();
        let kw = KeywordSources::default();

        let first = ingest_batch(&store, batch(5), &source(), "u1", &kw).await.unwrap();
        assert_eq!(first.added_count, 5);
        assert_eq!(first.duplicates_skipped, 0);
        assert_eq!(first.total_rows_now_in_store, 5);

        let second = ingest_batch(&store, batch(5), &source(), "u2", &kw).await.unwrap();
        assert_eq!(second.added_count, 0);
        assert_eq!(second.duplicates_skipped, 5);
        assert_eq!(second.total_rows_in_batch, 5);
        assert_eq!(second.total_rows_now_in_store, 5);

        let uploads = store.list_uploads().await.unwrap();
        assert_eq!(uploads.len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_with_cosmetic_changes_then_search() {
        use crate::search::SearchEngine;

        let store = InMemoryStore::new();
        let kw = KeywordSources::default();

        let first = ingest_batch(&store, vec![draft("Train halts at signal 12")], &source(), "u1", &kw)
            .await
            .unwrap();
        assert_eq!(first.added_count, 1);

        let again = ingest_batch(&store, vec![draft("  TRAIN   halts at Signal 12 ")], &source(), "u2", &kw)
            .await
            .unwrap();
        assert_eq!(again.added_count, 0);
        assert_eq!(again.duplicates_skipped, 1);

        let corpus = store.all_records().await.unwrap();
        let resp = SearchEngine::default().search(&corpus, "train halt signl", 10);
        assert_eq!(resp.results.len(), 1);
        assert!(resp.results[0].score > 0.0);
        assert!(resp.results[0].highlights[&RecordField::ScenarioSteps].contains("<mark>"));
    }

    #[tokio::test]
    async fn test_empty_batch_reports_zeroes() {
        let store = InMemoryStore::new();
        let summary = ingest_batch(&store, Vec::new(), &source(), "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.added_count, 0);
        assert_eq!(summary.duplicates_skipped, 0);
        assert_eq!(summary.total_rows_in_batch, 0);
        assert_eq!(summary.total_rows_now_in_store, 0);
        assert!(!summary.aborted);
        assert_eq!(store.list_uploads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_rejects_count_as_failed_rows() {
        let store = InMemoryStore::new();
        let mut src = source();
        src.rejected.push(RowError {
            row: 1,
            message: "row 1 is not an object".into(),
        });
        let summary = ingest_batch(&store, vec![draft("Gate stuck")], &src, "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.added_count, 1);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(summary.total_rows_in_batch, 2);
        let uploads = store.list_uploads().await.unwrap();
        assert_eq!(uploads[0].failed_rows, 1);
        assert_eq!(uploads[0].total_rows_in_file, 2);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch() {
        let store = InMemoryStore::new();
        let rows = vec![draft("Train halts"), draft("  TRAIN   halts "), draft("Other")];
        let summary = ingest_batch(&store, rows, &source(), "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.added_count, 2);
        assert_eq!(summary.duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn test_existing_record_untouched_by_duplicate() {
        let store = InMemoryStore::new();
        let kw = KeywordSources::default();
        ingest_batch(&store, vec![draft("Train halts")], &source(), "u1", &kw)
            .await
            .unwrap();
        let before = store.all_records().await.unwrap();

        let mut again = draft("train HALTS");
        again.offshore_comments = "non-canonical change".into();
        ingest_batch(&store, vec![again], &source(), "u2", &kw)
            .await
            .unwrap();

        assert_eq!(store.all_records().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_records_carry_keywords_and_upload_id() {
        let store = InMemoryStore::new();
        ingest_batch(
            &store,
            vec![draft("Authority conflict near BUG-77")],
            &source(),
            "u9",
            &KeywordSources::default(),
        )
        .await
        .unwrap();
        let rec = &store.all_records().await.unwrap()[0];
        assert_eq!(rec.keywords, "BUG-77, authority, conflict, near, bug");
        assert_eq!(rec.source_upload_id.as_deref(), Some("u9"));
        assert_eq!(rec.row_hash.len(), 64);
    }

    /// Wraps a store and lets a test script failures and races.
    struct ScriptedStore {
        inner: InMemoryStore,
        calls: AtomicUsize,
        fail_insert_at: Option<usize>,
        unavailable_from: Option<usize>,
        race_hash_lookup: bool,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                calls: AtomicUsize::new(0),
                fail_insert_at: None,
                unavailable_from: None,
                race_hash_lookup: false,
            }
        }
    }

    #[async_trait]
    impl RecordStore for ScriptedStore {
        async fn insert_record(&self, record: &Record) -> StoreResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable_from.is_some_and(|from| n >= from) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            if self.fail_insert_at == Some(n) {
                return Err(StoreError::Backend(anyhow::anyhow!("disk I/O error")));
            }
            self.inner.insert_record(record).await
        }
        async fn find_by_hash(&self, row_hash: &str) -> StoreResult<Option<Record>> {
            if self.race_hash_lookup {
                return Ok(None);
            }
            self.inner.find_by_hash(row_hash).await
        }
        async fn get_record(&self, id: &str) -> StoreResult<Option<Record>> {
            self.inner.get_record(id).await
        }
        async fn update_record(&self, record: &Record) -> StoreResult<()> {
            self.inner.update_record(record).await
        }
        async fn all_records(&self) -> StoreResult<Vec<Record>> {
            self.inner.all_records().await
        }
        async fn count_records(&self) -> StoreResult<u64> {
            self.inner.count_records().await
        }
        async fn record_upload(&self, upload: &UploadRecord) -> StoreResult<()> {
            self.inner.record_upload(upload).await
        }
        async fn list_uploads(&self) -> StoreResult<Vec<UploadRecord>> {
            self.inner.list_uploads().await
        }
    }

    #[tokio::test]
    async fn test_constraint_violation_is_duplicate_not_failure() {
        let mut store = ScriptedStore::new();
        store.race_hash_lookup = true;
        let rows = vec![draft("Same"), draft("same")];
        let summary = ingest_batch(&store, rows, &source(), "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.added_count, 1);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.failed_rows, 0);
    }

    #[tokio::test]
    async fn test_single_row_failure_does_not_abort() {
        let mut store = ScriptedStore::new();
        store.fail_insert_at = Some(1);
        let summary = ingest_batch(&store, batch(4), &source(), "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.added_count, 3);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(summary.errors[0].row, 1);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_row_errors_use_file_positions() {
        let mut store = ScriptedStore::new();
        store.fail_insert_at = Some(1);
        let mut src = source();
        src.rejected.push(RowError {
            row: 1,
            message: "row 1 is not an object".into(),
        });
        src.row_numbers = vec![0, 2, 3];
        let summary = ingest_batch(&store, batch(3), &src, "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert_eq!(summary.failed_rows, 2);
        let rows: Vec<usize> = summary.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(summary.errors[1].message, "disk I/O error");
    }

    #[tokio::test]
    async fn test_unavailable_store_aborts_with_partial_counts() {
        let mut store = ScriptedStore::new();
        store.unavailable_from = Some(2);
        let summary = ingest_batch(&store, batch(5), &source(), "u1", &KeywordSources::default())
            .await
            .unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.added_count, 2);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(summary.total_rows_in_batch, 5);
        assert_eq!(summary.total_rows_now_in_store, 2);
    }

    #[tokio::test]
    async fn test_create_then_duplicate_create() {
        let store = InMemoryStore::new();
        let kw = KeywordSources::default();
        let first = save_record(&store, draft("Train halts"), &kw, DedupPolicy::ContentHash).await;
        assert!(first.success);
        assert!(first.id.is_some());

        let second =
            save_record(&store, draft(" train  halts"), &kw, DedupPolicy::ContentHash).await;
        assert!(!second.success);
        assert_eq!(second.is_duplicate, Some(true));
        assert_eq!(store.count_records().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scenario_policy_ignores_other_fields() {
        let store = InMemoryStore::new();
        let kw = KeywordSources::default();
        save_record(&store, draft("Train halts"), &kw, DedupPolicy::Scenario).await;

        let mut other_status = draft("TRAIN halts");
        other_status.status = "Closed".into();
        let by_hash =
            save_record(&store, other_status.clone(), &kw, DedupPolicy::ContentHash).await;
        assert!(by_hash.success, "content hash differs, so create is allowed");

        let by_scenario = save_record(&store, draft("train halts "), &kw, DedupPolicy::Scenario).await;
        assert_eq!(by_scenario.is_duplicate, Some(true));
    }

    #[tokio::test]
    async fn test_edit_recomputes_hash_and_keywords() {
        let store = InMemoryStore::new();
        let kw = KeywordSources::default();
        let created = save_record(&store, draft("Train halts"), &kw, DedupPolicy::ContentHash).await;
        let id = created.id.unwrap();
        let before = store.get_record(&id).await.unwrap().unwrap();

        let mut edit = before.to_draft();
        edit.scenario_steps = "Signal shows wrong aspect".into();
        let outcome = save_record(&store, edit, &kw, DedupPolicy::ContentHash).await;
        assert!(outcome.success);

        let after = store.get_record(&id).await.unwrap().unwrap();
        assert_ne!(after.row_hash, before.row_hash);
        assert_eq!(after.keywords, "signal, shows, wrong, aspect");
        assert_eq!(after.first_seen_at, before.first_seen_at);
        assert_eq!(store.count_records().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_edit_unknown_id_reports_failure() {
        let store = InMemoryStore::new();
        let mut edit = draft("x");
        edit.id = Some("missing".into());
        let outcome =
            save_record(&store, edit, &KeywordSources::default(), DedupPolicy::ContentHash).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
        assert_eq!(outcome.is_duplicate, None);
    }
}
