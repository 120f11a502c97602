//! # treecopy Engine - File Tree Copy Library
//!
//! A headless engine that mirrors a file or directory tree into a target
//! root, designed as the foundation for multiple front ends (CLI,
//! automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - Recursive or top-level enumeration with whitelist/blacklist wildcard filters
//! - Per-file copy-or-skip decisions (overwrite, modification date, size)
//! - Chunked data transfer, synchronous or double-buffered
//! - Timestamp and attribute mirroring for files and created directories
//! - Cooperative cancellation and a per-run report
//! - Progress reporting via listeners (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{CopierStrategy, CopyOptions, Difference, TreeCopier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let copier = TreeCopier::new(CopierStrategy::DoubleBuffer);
//!
//! let mut options = CopyOptions::new("/data/photos", "/backup/photos");
//! options.recursive = true;
//! options.create_target = true;
//! options.overwrite = true;
//! options.difference = Difference::LastModifiedDate;
//!
//! let report = copier.copy(&options)?;
//! println!("{report}");
//! for failure in report.failures() {
//!     println!("{:?}: {:?}", failure.source_path, failure.error_message());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Options, per-file results and the enums controlling behavior
//! - **error**: Error types and handling
//! - **filter**: Wildcard path filter
//! - **probe**: Metadata snapshots
//! - **decision**: Copy-or-skip policy
//! - **data_copier**: Single and double buffer data transfer
//! - **fs_ops**: Enumeration, path mirroring and metadata sync
//! - **report**: Run report and its builder
//! - **job**: The `TreeCopier` orchestrator
//! - **progress**: Listener trait and cancellation token
//! - **process**: Post-copy external process

pub mod data_copier;
pub mod decision;
pub mod error;
pub mod filter;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod probe;
pub mod process;
pub mod progress;
pub mod report;

// Re-export main types and functions
pub use data_copier::{
    CopierStrategy, DataCopier, DoubleBufferCopier, SingleBufferCopier, Transfer,
};
pub use decision::{Decision, DecisionPolicy};
pub use error::EngineError;
pub use filter::PathFilter;
pub use job::TreeCopier;
pub use model::{
    CopyOptions, Difference, FileCopyResult, FilterMode, FilterSpec, Outcome, PostCopyCommand,
    SkipReason, DEFAULT_BUFFER_SIZE,
};
pub use probe::{FileAttributes, MetadataSnapshot};
pub use progress::{CancelToken, CopyListener, NextFile, ProcessStream};
pub use report::{CopyReport, CopyReportBuilder};
