//! Run report and the builder that accumulates it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{FileCopyResult, Outcome};

/// Final, read-only result of one `TreeCopier::copy` run.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    run_id: Uuid,
    successes: Vec<FileCopyResult>,
    skips: Vec<FileCopyResult>,
    failures: Vec<FileCopyResult>,
    interrupted: Option<FileCopyResult>,
    total_bytes_copied: u64,
    begin_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    cancelled: bool,
    aborted: bool,
    process_exit_code: Option<i32>,
}

impl CopyReport {
    /// Id shared by every log event of the run
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn successes(&self) -> &[FileCopyResult] {
        &self.successes
    }

    pub fn skips(&self) -> &[FileCopyResult] {
        &self.skips
    }

    pub fn failures(&self) -> &[FileCopyResult] {
        &self.failures
    }

    /// The file that was in flight when the run was cancelled
    pub fn interrupted(&self) -> Option<&FileCopyResult> {
        self.interrupted.as_ref()
    }

    /// Sum of `bytes_copied` over successful files only
    pub fn total_bytes_copied(&self) -> u64 {
        self.total_bytes_copied
    }

    pub fn begin_time(&self) -> DateTime<Utc> {
        self.begin_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// True when a run-level error stopped the run. Only listeners see such a
    /// report; `copy()` returns the error itself.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Exit code of the post-copy process, if one ran and exited normally
    pub fn process_exit_code(&self) -> Option<i32> {
        self.process_exit_code
    }

    /// End minus begin, or now minus begin if the end was never recorded.
    pub fn elapsed(&self) -> Duration {
        elapsed_between(self.begin_time, self.end_time)
    }

    /// Number of files that reached a terminal state.
    pub fn file_count(&self) -> usize {
        self.successes.len()
            + self.skips.len()
            + self.failures.len()
            + usize::from(self.interrupted.is_some())
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub(crate) fn set_process_exit_code(&mut self, code: Option<i32>) {
        self.process_exit_code = code;
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} copied={} skipped={} failed={} bytes={} cancelled={} elapsed_ms={}",
            self.successes.len(),
            self.skips.len(),
            self.failures.len(),
            self.total_bytes_copied,
            self.cancelled,
            self.elapsed().num_milliseconds()
        )
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[COPY]"))
    }
}

fn elapsed_between(begin: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Duration {
    end.unwrap_or_else(Utc::now) - begin
}

/// Mutable accumulator for a run in progress.
#[derive(Debug, Clone)]
pub struct CopyReportBuilder {
    run_id: Uuid,
    successes: Vec<FileCopyResult>,
    skips: Vec<FileCopyResult>,
    failures: Vec<FileCopyResult>,
    interrupted: Option<FileCopyResult>,
    total_bytes_copied: u64,
    begin_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl CopyReportBuilder {
    pub fn new(run_id: Uuid) -> Self {
        CopyReportBuilder {
            run_id,
            successes: Vec::new(),
            skips: Vec::new(),
            failures: Vec::new(),
            interrupted: None,
            total_bytes_copied: 0,
            begin_time: Utc::now(),
            end_time: None,
            cancelled: false,
        }
    }

    pub fn mark_begin(&mut self) {
        self.begin_time = Utc::now();
        self.end_time = None;
    }

    pub fn mark_end(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Flag the run as cancelled even when no file was in flight.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Classify one terminal result.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownOutcome` for a result that never left
    /// `Pending`.
    pub fn record(&mut self, result: FileCopyResult) -> Result<(), EngineError> {
        match result.outcome() {
            Outcome::Successful => {
                self.total_bytes_copied += result.bytes_copied();
                self.successes.push(result);
            }
            Outcome::Skipped => self.skips.push(result),
            Outcome::Failed => self.failures.push(result),
            Outcome::Cancelled => {
                self.cancelled = true;
                self.interrupted = Some(result);
            }
            Outcome::Pending => {
                return Err(EngineError::UnknownOutcome {
                    path: result.source_path,
                });
            }
        }
        Ok(())
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn skip_count(&self) -> usize {
        self.skips.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total_bytes_copied(&self) -> u64 {
        self.total_bytes_copied
    }

    /// Time since `mark_begin`, frozen once `mark_end` is called.
    pub fn elapsed(&self) -> Duration {
        elapsed_between(self.begin_time, self.end_time)
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> CopyReport {
        CopyReport {
            run_id: self.run_id,
            successes: self.successes,
            skips: self.skips,
            failures: self.failures,
            interrupted: self.interrupted,
            total_bytes_copied: self.total_bytes_copied,
            begin_time: self.begin_time,
            end_time: self.end_time,
            cancelled: self.cancelled,
            aborted: false,
            process_exit_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkipReason;
    use std::io;
    use std::path::PathBuf;

    fn result(name: &str) -> FileCopyResult {
        FileCopyResult::new(PathBuf::from("/src").join(name), PathBuf::from("/dst").join(name))
    }

    #[test]
    fn test_record_classifies_each_outcome_once() {
        let mut builder = CopyReportBuilder::new(Uuid::new_v4());

        let mut ok = result("a");
        ok.succeed(10);
        let mut skipped = result("b");
        skipped.skip(SkipReason::Size);
        let mut failed = result("c");
        failed.fail(&EngineError::ReadError {
            path: PathBuf::from("/src/c"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        let mut ok2 = result("d");
        ok2.succeed(5);

        for r in [ok, skipped, failed, ok2] {
            builder.record(r).expect("record");
        }
        builder.mark_end();
        let report = builder.build();

        assert_eq!(report.successes().len(), 2);
        assert_eq!(report.skips().len(), 1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.total_bytes_copied(), 15);
        assert_eq!(report.file_count(), 4);
        assert!(report.has_failures());
        assert!(!report.cancelled());
        assert!(!report.aborted());
        assert!(report.interrupted().is_none());
        assert_eq!(report.successes()[0].source_path, PathBuf::from("/src/a"));
        assert_eq!(report.successes()[1].source_path, PathBuf::from("/src/d"));
    }

    #[test]
    fn test_cancelled_result_is_kept_as_interrupted() {
        let mut builder = CopyReportBuilder::new(Uuid::new_v4());
        let mut cancelled = result("big");
        cancelled.cancel(4096);
        builder.record(cancelled).expect("record");

        let report = builder.build();
        assert!(report.cancelled());
        assert_eq!(report.total_bytes_copied(), 0);
        assert_eq!(
            report.interrupted().map(|r| r.bytes_copied()),
            Some(4096)
        );
        assert_eq!(report.file_count(), 1);
    }

    #[test]
    fn test_pending_result_is_rejected() {
        let mut builder = CopyReportBuilder::new(Uuid::new_v4());
        let err = builder.record(result("x")).expect_err("pending must be rejected");
        assert!(matches!(err, EngineError::UnknownOutcome { .. }));
        assert_eq!(builder.success_count() + builder.skip_count() + builder.failure_count(), 0);
    }

    #[test]
    fn test_elapsed_is_frozen_after_end() {
        let mut builder = CopyReportBuilder::new(Uuid::new_v4());
        builder.mark_begin();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(builder.elapsed() >= Duration::milliseconds(5));
        builder.mark_end();

        let report = builder.build();
        let first = report.elapsed();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(report.elapsed(), first);
    }

    #[test]
    fn test_format_summary_line() {
        let mut builder = CopyReportBuilder::new(Uuid::new_v4());
        let mut ok = result("a");
        ok.succeed(3);
        builder.record(ok).expect("record");
        builder.mark_end();
        let report = builder.build();

        let line = report.to_string();
        assert!(line.starts_with("[COPY] copied=1 skipped=0 failed=0 bytes=3 cancelled=false"));
    }
}
