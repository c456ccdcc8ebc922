//! Core domain types for markbatch conversion records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileStatus
// ---------------------------------------------------------------------------

/// Processing status of a file record.
///
/// Stored as a plain string column; values this tool does not know about are
/// kept verbatim in [`FileStatus::Other`] so they survive a read/write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    /// Registered but not yet ingested.
    Pending,
    /// Source HTML is in the object store and ready for conversion.
    Ingested,
    /// Markdown output was written.
    Converted,
    /// The last conversion attempt failed.
    Failed,
    /// Any status owned by another system.
    Other(String),
}

impl FileStatus {
    /// The string stored in the `status` column.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Ingested => "ingested",
            Self::Converted => "converted",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for FileStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "ingested" => Self::Ingested,
            "converted" => Self::Converted,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FileStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::str::FromStr for FileStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// One row of the `files` table: a single source document and its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Row key.
    pub id: i64,
    /// Location of the source HTML, e.g. `gs://bucket/docs/page.html.gz`.
    pub source_location: String,
    /// Current processing status.
    pub status: FileStatus,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the status was last written.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_roundtrip() {
        for s in ["pending", "ingested", "converted", "failed"] {
            let status: FileStatus = s.parse().unwrap();
            assert!(!matches!(status, FileStatus::Other(_)), "{s} parsed as Other");
            assert_eq!(status.as_str(), s);
        }
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status = FileStatus::from("quarantined");
        assert_eq!(status, FileStatus::Other("quarantined".into()));
        assert_eq!(status.to_string(), "quarantined");
    }

    #[test]
    fn record_serializes_status_as_string() {
        let record = FileRecord {
            id: 7,
            source_location: "gs://bucket/docs/a.html.gz".into(),
            status: FileStatus::Ingested,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["status"], "ingested");

        let parsed: FileRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.status, FileStatus::Ingested);
        assert_eq!(parsed.id, 7);
    }
}
