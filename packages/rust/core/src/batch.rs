//! Batch run: query `ingested` records, process each, record the outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{Span, error, info, instrument, warn};
use uuid::Uuid;

use markbatch_shared::{FileRecord, FileStatus, Result};

use crate::object_store::ObjectStore;
use crate::processor::{FileProcessor, Outcome};
use crate::rows::RowStore;

/// Process exit status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The query succeeded and every eligible record converted.
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// Counts for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: Uuid,
    /// Eligible records returned by the query.
    pub total: usize,
    pub converted: usize,
    pub failed: usize,
    /// Status writes that failed. Does not change the record's outcome.
    pub status_update_failures: usize,
    /// Records left untouched after cancellation.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    fn new(run_id: Uuid, total: usize) -> Self {
        Self {
            run_id,
            total,
            converted: 0,
            failed: 0,
            status_update_failures: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.failed == 0 && self.skipped == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }
}

/// Progress callback for reporting batch status.
pub trait BatchProgress: Send + Sync {
    /// Called once the eligible records are known.
    fn started(&self, total: usize);
    /// Called after each record's outcome is known.
    fn record_finished(&self, record: &FileRecord, outcome: &Outcome);
    /// Called when the batch completes.
    fn done(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn record_finished(&self, _record: &FileRecord, _outcome: &Outcome) {}
    fn done(&self, _summary: &BatchSummary) {}
}

/// Runs every `ingested` record through a [`FileProcessor`], one at a time,
/// in query order.
pub struct BatchRunner<R, S> {
    rows: R,
    processor: FileProcessor<S>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<R: RowStore, S: ObjectStore> BatchRunner<R, S> {
    pub fn new(rows: R, processor: FileProcessor<S>) -> Self {
        Self {
            rows,
            processor,
            cancel: None,
        }
    }

    /// Stop before the next record once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }

    pub fn processor(&self) -> &FileProcessor<S> {
        &self.processor
    }

    /// Run the batch and map the result to an exit status. A failed query is
    /// logged and reported as [`ExitStatus::Failure`].
    pub async fn run(&self, progress: &dyn BatchProgress) -> ExitStatus {
        match self.run_batch(progress).await {
            Ok(summary) => summary.exit_status(),
            Err(e) => {
                error!(error = %e, "batch aborted, no records processed");
                ExitStatus::Failure
            }
        }
    }

    /// Run the batch.
    ///
    /// 1. Query all `ingested` records; a failure aborts before any work
    /// 2. Process each record and write `converted` or `failed`
    /// 3. Count status-write failures without changing outcomes
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run_batch(&self, progress: &dyn BatchProgress) -> Result<BatchSummary> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        Span::current().record("run_id", tracing::field::display(run_id));

        let records = self.rows.query_by_status(&FileStatus::Ingested).await?;

        info!(total = records.len(), "starting batch");
        progress.started(records.len());

        let mut summary = BatchSummary::new(run_id, records.len());

        for (index, record) in records.iter().enumerate() {
            if self.is_cancelled() {
                summary.skipped = records.len() - index;
                warn!(
                    skipped = summary.skipped,
                    "batch cancelled, remaining records left ingested"
                );
                break;
            }

            let outcome = self.processor.process(record).await;
            let status = match &outcome {
                Outcome::Converted { .. } => {
                    summary.converted += 1;
                    FileStatus::Converted
                }
                Outcome::Failed(_) => {
                    summary.failed += 1;
                    FileStatus::Failed
                }
            };

            if let Err(e) = self.rows.update_status(record.id, &status).await {
                summary.status_update_failures += 1;
                warn!(
                    record_id = record.id,
                    status = %status,
                    error = %e,
                    "status update failed"
                );
            }

            progress.record_finished(record, &outcome);
        }

        summary.elapsed = start.elapsed();
        progress.done(&summary);

        info!(
            total = summary.total,
            converted = summary.converted,
            failed = summary.failed,
            status_update_failures = summary.status_update_failures,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed.as_millis(),
            "batch complete"
        );

        Ok(summary)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use markbatch_shared::ProcessorConfig;
    use markbatch_storage::Storage;

    use crate::object_store::FsObjectStore;
    use crate::testing::{MemoryRows, record, temp_store};

    const PAGE: &[u8] = b"<html><body><h1>Doc</h1><p>Body text.</p></body></html>";

    fn write_source(store: &FsObjectStore, object_path: &str) {
        let path = store.root().join("bucket").join(object_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, PAGE).unwrap();
    }

    fn runner<R: RowStore>(rows: R, store: FsObjectStore) -> BatchRunner<R, FsObjectStore> {
        BatchRunner::new(rows, FileProcessor::new(store, &ProcessorConfig::default()))
    }

    async fn temp_db() -> Storage {
        let tmp = std::env::temp_dir().join(format!("mb_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Cancels the batch as soon as the first record finishes.
    struct CancelAfterFirst {
        flag: Arc<AtomicBool>,
        seen: Mutex<Vec<i64>>,
    }

    impl BatchProgress for CancelAfterFirst {
        fn started(&self, _total: usize) {}
        fn record_finished(&self, record: &FileRecord, _outcome: &Outcome) {
            self.seen.lock().unwrap().push(record.id);
            self.flag.store(true, Ordering::SeqCst);
        }
        fn done(&self, _summary: &BatchSummary) {}
    }

    #[tokio::test]
    async fn one_missing_object_does_not_affect_the_others() {
        let store = temp_store();
        let db = temp_db().await;

        write_source(&store, "docs/one.html");
        write_source(&store, "docs/three.html");

        let one = db.insert_file("gs://bucket/docs/one.html", &FileStatus::Ingested).await.unwrap();
        let two = db.insert_file("gs://bucket/docs/two.html", &FileStatus::Ingested).await.unwrap();
        let three = db.insert_file("gs://bucket/docs/three.html", &FileStatus::Ingested).await.unwrap();

        let runner = runner(db, store.clone());
        let summary = runner.run_batch(&SilentProgress).await.expect("batch");

        assert_eq!(summary.total, 3);
        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_status(), ExitStatus::Failure);

        let db = runner.rows();
        assert_eq!(db.get_file(one).await.unwrap().unwrap().status, FileStatus::Converted);
        assert_eq!(db.get_file(two).await.unwrap().unwrap().status, FileStatus::Failed);
        assert_eq!(db.get_file(three).await.unwrap().unwrap().status, FileStatus::Converted);

        assert!(store.root().join("bucket/docs/markdown/one.md").is_file());
        assert!(store.root().join("bucket/docs/markdown/three.md").is_file());
        assert!(!store.root().join("bucket/docs/markdown/two.md").exists());

        // Nothing is left to pick up on a second run.
        assert_eq!(runner.run(&SilentProgress).await, ExitStatus::Success);
    }

    #[tokio::test]
    async fn only_ingested_records_are_processed() {
        let store = temp_store();
        let db = temp_db().await;
        write_source(&store, "a.html");
        write_source(&store, "b.html");

        let pending = db.insert_file("gs://bucket/a.html", &FileStatus::Pending).await.unwrap();
        let ingested = db.insert_file("gs://bucket/b.html", &FileStatus::Ingested).await.unwrap();

        let runner = runner(db, store);
        assert_eq!(runner.run(&SilentProgress).await, ExitStatus::Success);

        let db = runner.rows();
        assert_eq!(db.get_file(pending).await.unwrap().unwrap().status, FileStatus::Pending);
        assert_eq!(db.get_file(ingested).await.unwrap().unwrap().status, FileStatus::Converted);
    }

    #[tokio::test]
    async fn no_eligible_records_is_success() {
        let rows = MemoryRows::new(Vec::new());
        let runner = runner(rows, temp_store());

        let summary = runner.run_batch(&SilentProgress).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.exit_status(), ExitStatus::Success);
        assert!(runner.rows().updates().is_empty());
    }

    #[tokio::test]
    async fn failed_query_processes_and_updates_nothing() {
        let runner = runner(MemoryRows::failing_query(), temp_store());

        assert!(runner.run_batch(&SilentProgress).await.is_err());
        assert_eq!(runner.run(&SilentProgress).await, ExitStatus::Failure);
        assert!(runner.rows().updates().is_empty());
    }

    #[tokio::test]
    async fn status_update_failures_are_counted_not_fatal() {
        let store = temp_store();
        write_source(&store, "a.html");
        let rows = MemoryRows::failing_updates(vec![
            record(1, "gs://bucket/a.html"),
            record(2, "gs://bucket/missing.html"),
        ]);
        let runner = runner(rows, store);

        let summary = runner.run_batch(&SilentProgress).await.unwrap();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status_update_failures, 2);
    }

    #[tokio::test]
    async fn all_converted_with_update_failures_still_succeeds() {
        let store = temp_store();
        write_source(&store, "a.html");
        let rows = MemoryRows::failing_updates(vec![record(1, "gs://bucket/a.html")]);
        let runner = runner(rows, store);

        assert_eq!(runner.run(&SilentProgress).await, ExitStatus::Success);
    }

    #[tokio::test]
    async fn outcomes_map_to_statuses_in_query_order() {
        let store = temp_store();
        write_source(&store, "a.html");
        let rows = MemoryRows::new(vec![
            record(7, "gs://bucket/a.html"),
            record(3, "bad location"),
        ]);
        let runner = runner(rows, store);

        runner.run(&SilentProgress).await;
        assert_eq!(
            runner.rows().updates(),
            vec![(7, FileStatus::Converted), (3, FileStatus::Failed)]
        );
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_records() {
        let store = temp_store();
        for name in ["a.html", "b.html", "c.html"] {
            write_source(&store, name);
        }
        let rows = MemoryRows::new(vec![
            record(1, "gs://bucket/a.html"),
            record(2, "gs://bucket/b.html"),
            record(3, "gs://bucket/c.html"),
        ]);
        let flag = Arc::new(AtomicBool::new(false));
        let runner = runner(rows, store).with_cancel_flag(flag.clone());
        let progress = CancelAfterFirst {
            flag,
            seen: Mutex::new(Vec::new()),
        };

        let summary = runner.run_batch(&progress).await.unwrap();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.exit_status(), ExitStatus::Failure);
        assert_eq!(*progress.seen.lock().unwrap(), vec![1]);
        assert_eq!(runner.rows().updates(), vec![(1, FileStatus::Converted)]);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert!(ExitStatus::Success.is_success());
    }
}
