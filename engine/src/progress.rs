//! Progress reporting trait and cancellation token.
//!
//! This module defines the CopyListener trait, which decouples the copy
//! engine from any specific UI technology (CLI, GUI, automation).
//!
//! All listener methods are called synchronously on the thread driving
//! `TreeCopier::copy`. Listeners needing async work must offload it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::report::CopyReport;

/// Notification sent before each file's copy decision.
///
/// `target_path` is writable: a listener may redirect the file elsewhere.
/// When several listeners write it, the last one wins.
#[derive(Debug, Clone)]
pub struct NextFile {
    source_path: PathBuf,
    /// Where the file will be written
    pub target_path: PathBuf,
    index: usize,
    total: usize,
}

impl NextFile {
    pub(crate) fn new(source_path: PathBuf, target_path: PathBuf, index: usize, total: usize) -> Self {
        NextFile {
            source_path,
            target_path,
            index,
            total,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Zero-based position of this file in the run
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of files in the run after filtering
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Which pipe of the post-copy process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStream {
    Stdout,
    Stderr,
}

/// Trait for receiving notifications from a copy run.
///
/// Every method has an empty default so implementations only override the
/// notifications they care about.
pub trait CopyListener: Send + Sync {
    /// Called before the decision for each file.
    fn on_next_file(&self, _event: &mut NextFile) {}

    /// Called after each buffer is handed to the target file.
    ///
    /// `bytes_copied` is cumulative for the current file.
    fn on_chunk_copied(&self, _file_size: u64, _bytes_copied: u64) {}

    /// Called once when the run has finished (including cancelled runs).
    fn on_copy_ended(&self, _report: &CopyReport) {}

    /// Called for each non-empty output line of the post-copy process.
    fn on_process_output(&self, _line: &str, _stream: ProcessStream) {}

    /// Called when the post-copy process exits.
    fn on_process_ended(&self, _exit_code: Option<i32>) {}
}

impl<T: CopyListener + ?Sized> CopyListener for Arc<T> {
    fn on_next_file(&self, event: &mut NextFile) {
        (**self).on_next_file(event)
    }

    fn on_chunk_copied(&self, file_size: u64, bytes_copied: u64) {
        (**self).on_chunk_copied(file_size, bytes_copied)
    }

    fn on_copy_ended(&self, report: &CopyReport) {
        (**self).on_copy_ended(report)
    }

    fn on_process_output(&self, line: &str, stream: ProcessStream) {
        (**self).on_process_output(line, stream)
    }

    fn on_process_ended(&self, exit_code: Option<i32>) {
        (**self).on_process_ended(exit_code)
    }
}

/// Cooperative cancellation flag shared between a copier and its callers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Observed at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
