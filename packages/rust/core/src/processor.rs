//! Per-record conversion: resolve, fetch, decompress, clean, convert, write.

use std::fmt;

use tracing::{info, instrument, warn};

use markbatch_markdown::{ContentFilter, MarkdownConverter, ParseMode};
use markbatch_shared::{FileRecord, ProcessorConfig};

use crate::decompress::gunzip;
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::paths::{Location, PathResolver};

/// Pipeline stage a record was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Fetching,
    Decompressing,
    Cleaning,
    Converting,
    Writing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Decompressing => "decompressing",
            Self::Cleaning => "cleaning",
            Self::Converting => "converting",
            Self::Writing => "writing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Source location unparseable, or no output location derivable.
    InvalidPath,
    /// The source object does not exist.
    NotFound,
    /// The object store failed to read.
    FetchError,
    /// Corrupt or truncated gzip payload.
    DecompressError,
    /// Undecodable bytes, or parse errors in strict mode.
    CleaningError,
    ConversionError,
    /// The object store failed to write.
    WriteError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPath => "invalid_path",
            Self::NotFound => "not_found",
            Self::FetchError => "fetch_error",
            Self::DecompressError => "decompress_error",
            Self::CleaningError => "cleaning_error",
            Self::ConversionError => "conversion_error",
            Self::WriteError => "write_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} while {stage}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
}

impl Failure {
    fn new(kind: FailureKind, stage: Stage, cause: impl fmt::Display) -> Self {
        Self {
            kind,
            stage,
            message: cause.to_string(),
        }
    }
}

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Markdown was written to `output`.
    Converted { output: Location },
    Failed(Failure),
}

impl Outcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

/// Converts the source object of a single [`FileRecord`] into Markdown.
///
/// Reads the source at most once and writes only on success. Never retries.
pub struct FileProcessor<S> {
    store: S,
    resolver: PathResolver,
    filter: ContentFilter,
    converter: MarkdownConverter,
}

impl<S: ObjectStore> FileProcessor<S> {
    pub fn new(store: S, config: &ProcessorConfig) -> Self {
        let mode = if config.strict_parsing {
            ParseMode::Strict
        } else {
            ParseMode::Tolerant
        };
        Self {
            store,
            resolver: PathResolver::new(config.scheme.clone()),
            filter: ContentFilter::new(mode),
            converter: MarkdownConverter::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Run every stage for `record`. Failures are logged and returned as
    /// [`Outcome::Failed`], never propagated.
    #[instrument(skip_all, fields(record_id = record.id, source = %record.source_location))]
    pub async fn process(&self, record: &FileRecord) -> Outcome {
        match self.try_process(record).await {
            Ok(output) => {
                info!(output = %output, "converted");
                Outcome::Converted { output }
            }
            Err(failure) => {
                warn!(
                    stage = %failure.stage,
                    kind = %failure.kind,
                    cause = %failure.message,
                    "conversion failed"
                );
                Outcome::Failed(failure)
            }
        }
    }

    async fn try_process(&self, record: &FileRecord) -> Result<Location, Failure> {
        let source = self
            .resolver
            .parse(&record.source_location)
            .map_err(|e| Failure::new(FailureKind::InvalidPath, Stage::Resolving, e))?;

        let raw = self.store.get(&source).await.map_err(|e| {
            let kind = match e {
                ObjectStoreError::NotFound(_) => FailureKind::NotFound,
                ObjectStoreError::Transport(_) => FailureKind::FetchError,
            };
            Failure::new(kind, Stage::Fetching, e)
        })?;

        let html = if source.is_compressed() {
            gunzip(&raw)
                .map_err(|e| Failure::new(FailureKind::DecompressError, Stage::Decompressing, e))?
        } else {
            raw
        };

        let doc = self
            .filter
            .clean_bytes(&html)
            .map_err(|e| Failure::new(FailureKind::CleaningError, Stage::Cleaning, e))?;

        let markdown = self
            .converter
            .convert(doc)
            .map_err(|e| Failure::new(FailureKind::ConversionError, Stage::Converting, e))?;

        let output = self
            .resolver
            .output_for(&source)
            .map_err(|e| Failure::new(FailureKind::InvalidPath, Stage::Writing, e))?;

        self.store
            .put(&output, markdown.as_bytes())
            .await
            .map_err(|e| Failure::new(FailureKind::WriteError, Stage::Writing, e))?;

        Ok(output)
    }
}
