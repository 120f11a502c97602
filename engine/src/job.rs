//! Tree copy orchestration.
//!
//! [`TreeCopier`] walks a source file or directory, mirrors it under a target
//! root and produces a [`CopyReport`]:
//! - Enumerating and filtering the source files
//! - Creating mirrored directories, whose source metadata is applied once
//!   the last file has been written
//! - Deciding per file whether to copy or skip
//! - Transferring data through the configured [`DataCopier`]
//! - Syncing timestamps and attributes of copied files
//!
//! Individual file errors are recorded in the report and do NOT stop the run.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::data_copier::{CopierStrategy, DataCopier, Transfer};
use crate::decision::{self, Decision, DecisionPolicy};
use crate::error::EngineError;
use crate::filter::PathFilter;
use crate::fs_ops;
use crate::model::{CopyOptions, FileCopyResult, Outcome, SkipReason};
use crate::probe::MetadataSnapshot;
use crate::process;
use crate::progress::{CancelToken, CopyListener, NextFile};
use crate::report::{CopyReport, CopyReportBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// Moves the copier back to `Idle` when dropped.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = RunState::Idle;
    }
}

fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How one file left the pipeline, before it is written into a result.
enum FileStep {
    Skipped(SkipReason),
    Copied(u64),
    Cancelled(u64),
}

/// Copies a file or directory tree into a target root.
///
/// One run at a time per instance: a second `copy()` while one is in flight
/// fails with `EngineError::AlreadyRunning`. `cancel()` may be called from
/// any thread.
pub struct TreeCopier {
    state: Mutex<RunState>,
    cancel: CancelToken,
    data_copier: Box<dyn DataCopier>,
    listeners: Vec<Box<dyn CopyListener>>,
}

impl TreeCopier {
    pub fn new(strategy: CopierStrategy) -> Self {
        Self::with_data_copier(strategy.build())
    }

    /// Build around a custom data copier implementation.
    pub fn with_data_copier(data_copier: Box<dyn DataCopier>) -> Self {
        TreeCopier {
            state: Mutex::new(RunState::Idle),
            cancel: CancelToken::new(),
            data_copier,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn CopyListener>) {
        self.listeners.push(listener);
    }

    pub fn strategy(&self) -> CopierStrategy {
        self.data_copier.strategy()
    }

    /// Request cancellation of the current run.
    ///
    /// Observed after the next chunk or file; the file in flight ends
    /// `Cancelled` and its partial target is removed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels runs of this copier, for use from other threads
    /// or from listeners.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_busy(&self) -> bool {
        *lock_state(&self.state) == RunState::Running
    }

    /// Run a copy.
    ///
    /// # Errors
    /// Returns EngineError for run-level problems only: another run in
    /// flight, a missing or unreadable source, a malformed filter pattern.
    /// File-level errors are recorded in the report.
    pub fn copy(&self, options: &CopyOptions) -> Result<CopyReport, EngineError> {
        let guard = self.begin_run()?;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("copy", run_id = %run_id);
        let _entered = span.enter();

        let mut builder = CopyReportBuilder::new(run_id);
        builder.mark_begin();
        let walked = self.walk(&mut builder, options);
        builder.mark_end();

        tracing::info!(
            copied = builder.success_count(),
            skipped = builder.skip_count(),
            failed = builder.failure_count(),
            bytes = builder.total_bytes_copied(),
            elapsed_ms = builder.elapsed().num_milliseconds(),
            "Copy finished"
        );
        let mut report = builder.build();
        if let Err(e) = &walked {
            tracing::error!(error = %e.detailed_message(), "Copy aborted");
            report.mark_aborted();
        }
        drop(guard);

        for listener in &self.listeners {
            listener.on_copy_ended(&report);
        }
        walked?;

        if report.cancelled() {
            return Ok(report);
        }

        if let Some(command) = &options.post_copy {
            match process::run_post_copy(command, &self.listeners) {
                Ok(exit_code) => report.set_process_exit_code(exit_code),
                Err(e) => tracing::error!(
                    program = %command.program.display(),
                    error = %e,
                    "Failed to start post-copy process"
                ),
            }
        }

        Ok(report)
    }

    fn begin_run(&self) -> Result<RunGuard<'_>, EngineError> {
        let mut state = lock_state(&self.state);
        if *state == RunState::Running {
            return Err(EngineError::AlreadyRunning);
        }
        *state = RunState::Running;
        self.cancel.reset();
        Ok(RunGuard { state: &self.state })
    }

    fn walk(
        &self,
        builder: &mut CopyReportBuilder,
        options: &CopyOptions,
    ) -> Result<(), EngineError> {
        let source = absolute_path(&options.source_path)?;
        let target_root = absolute_path(&options.target_path)?;
        let filter = PathFilter::from_spec(&options.filter)?;

        tracing::info!(
            source = %source.display(),
            target = %target_root.display(),
            overwrite = options.overwrite,
            difference = %options.difference,
            recursive = options.recursive,
            dry_run = options.dry_run,
            strategy = ?self.strategy(),
            "Starting copy"
        );

        let sources = fs_ops::enumerate_sources(&source, options.recursive)?;
        let files: Vec<PathBuf> = sources
            .files
            .into_iter()
            .filter(|path| filter.check(path))
            .collect();
        tracing::debug!(files = files.len(), "Enumerated source files");

        if options.create_target && !options.dry_run {
            if let Err(e) = fs_ops::ensure_dir_exists(&target_root) {
                tracing::error!(error = %e.detailed_message(), "Could not create target root");
            }
        }

        let policy = DecisionPolicy {
            filter: &filter,
            overwrite: options.overwrite,
            difference: options.difference,
        };

        let mut created_dirs = Vec::new();
        let walked = self.copy_files(
            builder,
            &policy,
            &files,
            &sources.relative_root,
            &target_root,
            &mut created_dirs,
            options,
        );
        fs_ops::sync_created_dirs(&created_dirs);
        walked
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_files(
        &self,
        builder: &mut CopyReportBuilder,
        policy: &DecisionPolicy<'_>,
        files: &[PathBuf],
        relative_root: &Path,
        target_root: &Path,
        created_dirs: &mut Vec<fs_ops::CreatedDir>,
        options: &CopyOptions,
    ) -> Result<(), EngineError> {
        let total = files.len();
        for (index, source_file) in files.iter().enumerate() {
            let mirrored = fs_ops::mirror_target_path(source_file, relative_root, target_root);
            let mut prepared = if options.dry_run {
                Ok(())
            } else {
                fs_ops::create_mirrored_dirs(source_file, relative_root, target_root)
                    .map(|created| created_dirs.extend(created))
            };

            let mut event = NextFile::new(source_file.clone(), mirrored.clone(), index, total);
            for listener in &self.listeners {
                listener.on_next_file(&mut event);
            }

            let target_file = if event.target_path == mirrored {
                mirrored
            } else {
                match absolute_path(&event.target_path) {
                    Ok(path) => {
                        tracing::debug!(target = %path.display(), "Target overridden by listener");
                        if prepared.is_ok() && options.create_target && !options.dry_run {
                            prepared = path.parent().map_or(Ok(()), fs_ops::ensure_dir_exists);
                        }
                        path
                    }
                    Err(e) => {
                        prepared = Err(e);
                        event.target_path
                    }
                }
            };

            if options.dry_run {
                tracing::info!(
                    source = %source_file.display(),
                    target = %target_file.display(),
                    "Dry run"
                );
            } else {
                let result = self.copy_file(policy, source_file, &target_file, prepared, options);
                log_result(&result);
                builder.record(result)?;
            }

            if self.cancel.is_cancelled() {
                builder.mark_cancelled();
                tracing::warn!(
                    completed = index + 1,
                    remaining = total - index - 1,
                    "Copy cancelled"
                );
                break;
            }
        }
        Ok(())
    }

    fn copy_file(
        &self,
        policy: &DecisionPolicy<'_>,
        source: &Path,
        target: &Path,
        prepared: Result<(), EngineError>,
        options: &CopyOptions,
    ) -> FileCopyResult {
        let mut result = FileCopyResult::new(source, target);
        match prepared.and_then(|()| self.transfer_file(policy, source, target, options)) {
            Ok(FileStep::Skipped(reason)) => result.skip(reason),
            Ok(FileStep::Copied(bytes)) => result.succeed(bytes),
            Ok(FileStep::Cancelled(bytes)) => result.cancel(bytes),
            Err(e) => result.fail(&e),
        }
        result
    }

    fn transfer_file(
        &self,
        policy: &DecisionPolicy<'_>,
        source: &Path,
        target: &Path,
        options: &CopyOptions,
    ) -> Result<FileStep, EngineError> {
        let source_snapshot = MetadataSnapshot::probe(source)?;
        let target_snapshot = MetadataSnapshot::probe(target)?;

        let decision = policy.decide(&source_snapshot, &target_snapshot);
        if let Decision::Skip(reason) = decision {
            return Ok(FileStep::Skipped(reason));
        }

        let cleared_read_only = decision::prepare_target(decision, &target_snapshot)?;

        let mut on_chunk = |file_size: u64, bytes_copied: u64| {
            for listener in &self.listeners {
                listener.on_chunk_copied(file_size, bytes_copied);
            }
        };
        let step = self
            .data_copier
            .copy(source, target, options.buffer_size, &self.cancel, &mut on_chunk)
            .and_then(|transfer| match transfer {
                Transfer::Completed { bytes_copied } => {
                    fs_ops::sync_metadata(source, target)?;
                    Ok(FileStep::Copied(bytes_copied))
                }
                Transfer::Cancelled { bytes_copied } => Ok(FileStep::Cancelled(bytes_copied)),
            });

        if cleared_read_only && !matches!(step, Ok(FileStep::Copied(_))) {
            restore_read_only(target);
        }
        step
    }
}

/// Put back a read-only flag cleared for an overwrite that did not succeed.
fn restore_read_only(target: &Path) {
    if !target.exists() {
        return;
    }
    match fs_ops::set_read_only(target, true) {
        Ok(()) => tracing::debug!(path = %target.display(), "Restored read-only attribute"),
        Err(e) => tracing::warn!(
            path = %target.display(),
            error = %e,
            "Could not restore read-only attribute"
        ),
    }
}

fn log_result(result: &FileCopyResult) {
    let source = result.source_path.display();
    match result.outcome() {
        Outcome::Successful => {
            tracing::info!(source = %source, bytes = result.bytes_copied(), "Copied")
        }
        Outcome::Skipped => {
            let reason = result.skip_reason().map(|r| r.to_string()).unwrap_or_default();
            tracing::info!(source = %source, reason = %reason, "Skipped")
        }
        Outcome::Failed => tracing::error!(
            source = %source,
            error = result.error_message().unwrap_or_default(),
            "Failed"
        ),
        Outcome::Cancelled => {
            tracing::warn!(source = %source, bytes = result.bytes_copied(), "Interrupted")
        }
        Outcome::Pending => {}
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf, EngineError> {
    if path.as_os_str().is_empty() {
        return Err(EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "Path is empty".to_string(),
        });
    }
    std::path::absolute(path).map_err(|e| EngineError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
