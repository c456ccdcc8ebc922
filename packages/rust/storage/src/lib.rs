//! libSQL storage layer for file records (local, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the `files` table:
//! one row per source document and its processing status.
//!
//! **Access rules:**
//! - `markbatch run` / `enqueue`: read-write via [`Storage::open`]
//! - `markbatch list`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use markbatch_shared::{FileRecord, FileStatus, MarkbatchError, Result};

const SELECT_FILES: &str = "SELECT id, source_path, status, created_at, updated_at FROM files";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MarkbatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MarkbatchError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MarkbatchError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(MarkbatchError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // File operations
    // -----------------------------------------------------------------------

    /// Insert a file record and return its id.
    pub async fn insert_file(&self, source_path: &str, status: &FileStatus) -> Result<i64> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO files (source_path, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![source_path, status.as_str(), now.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a file record by id.
    pub async fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_FILES} WHERE id = ?1"), params![id])
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_file_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(MarkbatchError::Storage(e.to_string())),
        }
    }

    /// All records in `status`, most recently updated first, ties by id.
    pub async fn list_files_by_status(&self, status: &FileStatus) -> Result<Vec<FileRecord>> {
        let rows = self
            .conn
            .query(
                &format!("{SELECT_FILES} WHERE status = ?1 ORDER BY updated_at DESC, id ASC"),
                params![status.as_str()],
            )
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        collect_records(rows).await
    }

    /// Every record, most recently updated first.
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let rows = self
            .conn
            .query(
                &format!("{SELECT_FILES} ORDER BY updated_at DESC, id ASC"),
                params![],
            )
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        collect_records(rows).await
    }

    /// Set the status of one record and advance its `updated_at`.
    ///
    /// Fails when no row has `id`.
    pub async fn update_status(&self, id: i64, status: &FileStatus) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE files SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), id],
            )
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        if changed == 0 {
            return Err(MarkbatchError::Storage(format!("no file with id {id}")));
        }
        Ok(())
    }

    /// Number of records per status, ordered by status name.
    pub async fn count_by_status(&self) -> Result<Vec<(FileStatus, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM files GROUP BY status ORDER BY status",
                params![],
            )
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?;

        let mut counts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?
        {
            let status = row
                .get::<String>(0)
                .map_err(|e| MarkbatchError::Storage(e.to_string()))?;
            let count = row
                .get::<i64>(1)
                .map_err(|e| MarkbatchError::Storage(e.to_string()))?;
            counts.push((FileStatus::from(status), count.max(0) as u64));
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// UTC, nanosecond precision, `Z` suffix. Fixed width, so text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MarkbatchError::Storage(format!("invalid date: {e}")))
}

async fn collect_records(mut rows: libsql::Rows) -> Result<Vec<FileRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| MarkbatchError::Storage(e.to_string()))?
    {
        records.push(row_to_file_record(&row)?);
    }
    Ok(records)
}

fn row_to_file_record(row: &libsql::Row) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row
            .get::<i64>(0)
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?,
        source_location: row
            .get::<String>(1)
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?,
        status: row
            .get::<String>(2)
            .map_err(|e| MarkbatchError::Storage(e.to_string()))?
            .into(),
        created_at: parse_timestamp(
            &row.get::<String>(3)
                .map_err(|e| MarkbatchError::Storage(e.to_string()))?,
        )?,
        updated_at: parse_timestamp(
            &row.get::<String>(4)
                .map_err(|e| MarkbatchError::Storage(e.to_string()))?,
        )?,
    })
}
