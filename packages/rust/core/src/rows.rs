//! Row store contract over the `files` table.

use markbatch_shared::{FileRecord, FileStatus, MarkbatchError, Result};
use markbatch_storage::Storage;

/// Status-filtered reads and per-row status writes.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    /// Every record in `status`, in store order. Failures are
    /// [`MarkbatchError::Query`].
    async fn query_by_status(&self, status: &FileStatus) -> Result<Vec<FileRecord>>;

    /// Write `status` for record `id`.
    async fn update_status(&self, id: i64, status: &FileStatus) -> Result<()>;
}

impl RowStore for Storage {
    async fn query_by_status(&self, status: &FileStatus) -> Result<Vec<FileRecord>> {
        self.list_files_by_status(status)
            .await
            .map_err(|e| MarkbatchError::Query(e.to_string()))
    }

    async fn update_status(&self, id: i64, status: &FileStatus) -> Result<()> {
        Storage::update_status(self, id, status).await
    }
}
