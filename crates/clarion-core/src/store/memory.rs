//! In-memory [`RecordStore`] implementation for tests and embedding.
//!
//! Records live in a `Vec` behind a `std::sync::RwLock`, with a hash index
//! checked under the same write lock as the insert, which gives the same
//! atomic uniqueness guarantee as a database constraint.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::models::{Record, UploadRecord};

use super::{RecordStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    records: Vec<Record>,
    by_hash: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    uploads: Vec<UploadRecord>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_record(&self, record: &Record) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.by_hash.contains_key(&record.row_hash) {
            return Err(StoreError::DuplicateHash(record.row_hash.clone()));
        }
        let idx = inner.records.len();
        inner.by_hash.insert(record.row_hash.clone(), idx);
        inner.by_id.insert(record.id.clone(), idx);
        inner.records.push(record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, row_hash: &str) -> StoreResult<Option<Record>> {
        let inner = self.read()?;
        Ok(inner
            .by_hash
            .get(row_hash)
            .map(|&idx| inner.records[idx].clone()))
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<Record>> {
        let inner = self.read()?;
        Ok(inner.by_id.get(id).map(|&idx| inner.records[idx].clone()))
    }

    async fn update_record(&self, record: &Record) -> StoreResult<()> {
        let mut inner = self.write()?;
        let idx = *inner
            .by_id
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;

        if let Some(&owner) = inner.by_hash.get(&record.row_hash) {
            if owner != idx {
                return Err(StoreError::DuplicateHash(record.row_hash.clone()));
            }
        }

        let old_hash = inner.records[idx].row_hash.clone();
        inner.by_hash.remove(&old_hash);
        inner.by_hash.insert(record.row_hash.clone(), idx);

        let stored = &mut inner.records[idx];
        let first_seen_at = stored.first_seen_at;
        let source_upload_id = stored.source_upload_id.take();
        *stored = record.clone();
        stored.first_seen_at = first_seen_at;
        stored.source_upload_id = source_upload_id;
        Ok(())
    }

    async fn all_records(&self) -> StoreResult<Vec<Record>> {
        Ok(self.read()?.records.clone())
    }

    async fn count_records(&self) -> StoreResult<u64> {
        Ok(self.read()?.records.len() as u64)
    }

    async fn record_upload(&self, upload: &UploadRecord) -> StoreResult<()> {
        self.write()?.uploads.push(upload.clone());
        Ok(())
    }

    async fn list_uploads(&self) -> StoreResult<Vec<UploadRecord>> {
        let mut uploads = self.read()?.uploads.clone();
        uploads.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(uploads)
    }
}
