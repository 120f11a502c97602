//! Core data model for copy runs.
//!
//! This module defines the main data structures for describing a copy run:
//! - CopyOptions: what to copy, where, and under which policies
//! - FileCopyResult: the terminal record for a single file
//! - Outcome, SkipReason, Difference, FilterMode: enums controlling behavior

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default chunk size for both data copier strategies (1000 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1000 * 1024;

/// Options controlling a single `TreeCopier::copy` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Source file or directory
    pub source_path: PathBuf,

    /// Root directory the source is mirrored into
    pub target_path: PathBuf,

    /// Whether existing target files may be replaced
    pub overwrite: bool,

    /// Change detection applied when overwriting
    pub difference: Difference,

    /// Descend into subdirectories of a directory source
    pub recursive: bool,

    /// Create the target root directory when it does not exist
    pub create_target: bool,

    /// Evaluate everything, touch nothing
    pub dry_run: bool,

    /// Which source files take part in the run
    pub filter: FilterSpec,

    /// Chunk size handed to the data copier
    pub buffer_size: usize,

    /// Command launched after a run that was not cancelled
    pub post_copy: Option<PostCopyCommand>,
}

impl CopyOptions {
    /// Options with the defaults: no overwrite, no recursion, blacklist
    /// filter with no patterns, default buffer size.
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        CopyOptions {
            source_path: source_path.into(),
            target_path: target_path.into(),
            overwrite: false,
            difference: Difference::Ignore,
            recursive: false,
            create_target: false,
            dry_run: false,
            filter: FilterSpec::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            post_copy: None,
        }
    }
}

/// Change detection used to skip files that are already up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difference {
    /// Overwrite regardless of the target's state
    #[default]
    Ignore,
    /// Skip when source and target modification times are equal
    LastModifiedDate,
    /// Skip when source and target sizes are equal
    Size,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::Ignore => write!(f, "Ignore"),
            Difference::LastModifiedDate => write!(f, "LastModifiedDate"),
            Difference::Size => write!(f, "Size"),
        }
    }
}

/// Polarity of a path filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Only paths matching a pattern are included
    Whitelist,
    /// Paths matching a pattern are excluded
    #[default]
    Blacklist,
}

/// Uncompiled filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub mode: FilterMode,
    /// Pipe-delimited wildcard patterns, e.g. `*.tmp|*.bak`
    pub patterns: String,
}

impl FilterSpec {
    pub fn whitelist(patterns: impl Into<String>) -> Self {
        FilterSpec {
            mode: FilterMode::Whitelist,
            patterns: patterns.into(),
        }
    }

    pub fn blacklist(patterns: impl Into<String>) -> Self {
        FilterSpec {
            mode: FilterMode::Blacklist,
            patterns: patterns.into(),
        }
    }
}

/// External program run after the copy finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCopyCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Why a file was not copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Rejected by the path filter
    Filter,
    /// Target exists and overwriting is disabled
    Overwrite,
    /// Modification times are equal
    LastModifiedDate,
    /// Sizes are equal
    Size,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Filter => write!(f, "Filter"),
            SkipReason::Overwrite => write!(f, "Overwrite"),
            SkipReason::LastModifiedDate => write!(f, "LastModifiedDate"),
            SkipReason::Size => write!(f, "Size"),
        }
    }
}

/// The state of an individual file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Not yet decided
    Pending,
    /// Bytes and metadata transferred
    Successful,
    /// Not copied by policy
    Skipped,
    /// Error occurred; target removed or left untouched
    Failed,
    /// Interrupted by a cancellation request
    Cancelled,
}

impl Outcome {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "Pending"),
            Outcome::Successful => write!(f, "Successful"),
            Outcome::Skipped => write!(f, "Skipped"),
            Outcome::Failed => write!(f, "Failed"),
            Outcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Record of what happened to one source file.
///
/// Created `Pending` and moved exactly once into a terminal state through
/// [`succeed`](Self::succeed), [`skip`](Self::skip), [`fail`](Self::fail) or
/// [`cancel`](Self::cancel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCopyResult {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    outcome: Outcome,
    skip_reason: Option<SkipReason>,
    error_code: Option<i32>,
    error_message: Option<String>,
    bytes_copied: u64,
}

impl FileCopyResult {
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        FileCopyResult {
            source_path: source_path.into(),
            target_path: target_path.into(),
            outcome: Outcome::Pending,
            skip_reason: None,
            error_code: None,
            error_message: None,
            bytes_copied: 0,
        }
    }

    pub fn succeed(&mut self, bytes_copied: u64) {
        debug_assert!(!self.outcome.is_terminal());
        self.outcome = Outcome::Successful;
        self.bytes_copied = bytes_copied;
    }

    pub fn skip(&mut self, reason: SkipReason) {
        debug_assert!(!self.outcome.is_terminal());
        self.outcome = Outcome::Skipped;
        self.skip_reason = Some(reason);
        self.bytes_copied = 0;
    }

    pub fn fail(&mut self, error: &EngineError) {
        debug_assert!(!self.outcome.is_terminal());
        self.outcome = Outcome::Failed;
        self.error_code = error.raw_os_error();
        self.error_message = Some(error.detailed_message());
    }

    /// Marks the file as interrupted; `bytes_copied` is how far it got
    /// before the partial target was removed.
    pub fn cancel(&mut self, bytes_copied: u64) {
        debug_assert!(!self.outcome.is_terminal());
        self.outcome = Outcome::Cancelled;
        self.bytes_copied = bytes_copied;
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    /// OS error code if the failure came from the operating system
    pub fn error_code(&self) -> Option<i32> {
        self.error_code
    }

    /// Human-readable error message
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }
}
