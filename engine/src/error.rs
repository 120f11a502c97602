//! Error types for the copy engine.
//!
//! `EngineError` represents job-level errors that prevent a copy run from
//! being executed or completed. File-level errors are recorded in the
//! `FileCopyResult` for that file, not raised as `EngineError`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur at the job level.
///
/// Per-file read/write/metadata failures are captured as a Failed
/// `FileCopyResult`; the variants carrying an `io::Error` are also used to
/// describe those failures before they are flattened into the result.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another `copy()` call is in flight on the same copier
    #[error("Another copy is in progress")]
    AlreadyRunning,

    /// Source path does not exist
    #[error("Source path not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source path is not accessible (permissions)
    #[error("Source path access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path cannot be resolved or is otherwise unusable
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to enumerate the source directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a target directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Metadata probe failed for a reason other than the path being absent
    #[error("Failed to read metadata: {}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from a source file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a target file, or to sync its metadata
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A filter pattern could not be compiled
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A non-terminal result reached the aggregator
    #[error("Unknown copy outcome for {}", path.display())]
    UnknownOutcome { path: PathBuf },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_source().and_then(io::Error::raw_os_error)
    }

    /// Human-readable message including the underlying I/O cause.
    ///
    /// `Display` only names the path; per-file records want the cause too.
    pub fn detailed_message(&self) -> String {
        match self.io_source() {
            Some(source) => format!("{self}: {source}"),
            None => self.to_string(),
        }
    }

    fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::Probe { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. } => Some(source),
            _ => None,
        }
    }
}
