//! Collaborators and fixtures shared by the unit tests of this crate.

use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use uuid::Uuid;

use markbatch_shared::{FileRecord, FileStatus, MarkbatchError, Result};

use crate::object_store::{FsObjectStore, ObjectStore, ObjectStoreError};
use crate::paths::Location;
use crate::rows::RowStore;

pub(crate) fn temp_store() -> FsObjectStore {
    FsObjectStore::new(std::env::temp_dir().join(format!("mb_store_{}", Uuid::now_v7())))
}

pub(crate) fn record(id: i64, source_location: &str) -> FileRecord {
    let now = Utc::now();
    FileRecord {
        id,
        source_location: source_location.to_string(),
        status: FileStatus::Ingested,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wraps a filesystem store and fails reads or writes on demand.
pub(crate) struct FlakyStore {
    inner: FsObjectStore,
    fail_get: bool,
    fail_put: bool,
}

impl FlakyStore {
    pub(crate) fn failing_get(inner: FsObjectStore) -> Self {
        Self {
            inner,
            fail_get: true,
            fail_put: false,
        }
    }

    pub(crate) fn failing_put(inner: FsObjectStore) -> Self {
        Self {
            inner,
            fail_get: false,
            fail_put: true,
        }
    }
}

impl ObjectStore for FlakyStore {
    async fn get(&self, location: &Location) -> std::result::Result<Vec<u8>, ObjectStoreError> {
        if self.fail_get {
            return Err(ObjectStoreError::Transport("connection reset".into()));
        }
        self.inner.get(location).await
    }

    async fn put(
        &self,
        location: &Location,
        bytes: &[u8],
    ) -> std::result::Result<(), ObjectStoreError> {
        if self.fail_put {
            return Err(ObjectStoreError::Transport("quota exceeded".into()));
        }
        self.inner.put(location, bytes).await
    }
}

/// In-memory row store that records every status write.
pub(crate) struct MemoryRows {
    records: Vec<FileRecord>,
    fail_query: bool,
    fail_updates: bool,
    updates: Mutex<Vec<(i64, FileStatus)>>,
}

impl MemoryRows {
    pub(crate) fn new(records: Vec<FileRecord>) -> Self {
        Self {
            records,
            fail_query: false,
            fail_updates: false,
            updates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_query() -> Self {
        Self {
            fail_query: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn failing_updates(records: Vec<FileRecord>) -> Self {
        Self {
            fail_updates: true,
            ..Self::new(records)
        }
    }

    pub(crate) fn updates(&self) -> Vec<(i64, FileStatus)> {
        self.updates.lock().unwrap().clone()
    }
}

impl RowStore for MemoryRows {
    async fn query_by_status(&self, status: &FileStatus) -> Result<Vec<FileRecord>> {
        if self.fail_query {
            return Err(MarkbatchError::Query("database is locked".into()));
        }
        Ok(self
            .records
            .iter()
            .filter(|r| &r.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: i64, status: &FileStatus) -> Result<()> {
        if self.fail_updates {
            return Err(MarkbatchError::Storage("disk I/O error".into()));
        }
        self.updates.lock().unwrap().push((id, status.clone()));
        Ok(())
    }
}
