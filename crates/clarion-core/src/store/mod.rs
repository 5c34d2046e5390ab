//! Storage abstraction for Clarion.
//!
//! The [`RecordStore`] trait covers everything the ingestion orchestrator
//! and the search service need from persistence. Implementations must
//! enforce uniqueness of `row_hash` atomically and report a violation as
//! [`StoreError::DuplicateHash`], so a check-then-insert race between
//! concurrent uploads resolves to a duplicate skip instead of a failure.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Record, UploadRecord};

/// Errors surfaced by a [`RecordStore`].
///
/// `DuplicateHash` is a data condition, `Unavailable` means the backend is
/// unreachable as a whole, and `Backend` is any other per-operation failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record with hash {0} already exists")]
    DuplicateHash(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateHash(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Abstract record storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_record`](RecordStore::insert_record) | Insert, rejecting a duplicate `row_hash` |
/// | [`find_by_hash`](RecordStore::find_by_hash) | Lookup by content hash |
/// | [`get_record`](RecordStore::get_record) | Lookup by identity |
/// | [`update_record`](RecordStore::update_record) | Replace a record in place by identity |
/// | [`all_records`](RecordStore::all_records) | Full scan, used to build the search corpus |
/// | [`count_records`](RecordStore::count_records) | Total stored records |
/// | [`record_upload`](RecordStore::record_upload) | Persist a batch audit row |
/// | [`list_uploads`](RecordStore::list_uploads) | Upload history, newest first |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::DuplicateHash`] if a
    /// record with the same `row_hash` exists.
    async fn insert_record(&self, record: &Record) -> StoreResult<()>;

    async fn find_by_hash(&self, row_hash: &str) -> StoreResult<Option<Record>>;

    async fn get_record(&self, id: &str) -> StoreResult<Option<Record>>;

    /// Overwrite the record with `record.id`. `first_seen_at` and
    /// `source_upload_id` of the stored row are preserved. Fails with
    /// [`StoreError::NotFound`] if no such record exists.
    async fn update_record(&self, record: &Record) -> StoreResult<()>;

    /// Every stored record, in insertion order.
    async fn all_records(&self) -> StoreResult<Vec<Record>>;

    async fn count_records(&self) -> StoreResult<u64>;

    async fn record_upload(&self, upload: &UploadRecord) -> StoreResult<()>;

    async fn list_uploads(&self) -> StoreResult<Vec<UploadRecord>>;
}
