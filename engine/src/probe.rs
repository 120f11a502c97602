//! Metadata snapshots of source and target paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::EngineError;

/// Attribute bits the engine understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub read_only: bool,
    pub hidden: bool,
    pub system: bool,
}

impl FileAttributes {
    fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        let (hidden, system) = hidden_and_system(path, metadata);
        FileAttributes {
            read_only: metadata.permissions().readonly(),
            hidden,
            system,
        }
    }
}

#[cfg(windows)]
fn hidden_and_system(_path: &Path, metadata: &fs::Metadata) -> (bool, bool) {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    let bits = metadata.file_attributes();
    (
        bits & FILE_ATTRIBUTE_HIDDEN == FILE_ATTRIBUTE_HIDDEN,
        bits & FILE_ATTRIBUTE_SYSTEM == FILE_ATTRIBUTE_SYSTEM,
    )
}

#[cfg(not(windows))]
fn hidden_and_system(path: &Path, _metadata: &fs::Metadata) -> (bool, bool) {
    let hidden = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    (hidden, false)
}

/// Point-in-time view of a path's metadata.
///
/// `exists == false` means the path was absent when probed; every other field
/// is then zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSnapshot {
    path: PathBuf,
    exists: bool,
    is_dir: bool,
    size: u64,
    attributes: FileAttributes,
    created: Option<FileTime>,
    modified: FileTime,
    accessed: FileTime,
}

impl MetadataSnapshot {
    /// Probe `path`. A missing path is not an error.
    ///
    /// # Errors
    /// Returns `EngineError::Probe` for any failure other than `NotFound`.
    pub fn probe(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let mut snapshot = MetadataSnapshot {
            path: path.into(),
            exists: false,
            is_dir: false,
            size: 0,
            attributes: FileAttributes::default(),
            created: None,
            modified: FileTime::zero(),
            accessed: FileTime::zero(),
        };
        snapshot.refresh()?;
        Ok(snapshot)
    }

    /// Re-read the metadata of the same path.
    pub fn refresh(&mut self) -> Result<(), EngineError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => {
                self.exists = true;
                self.is_dir = metadata.is_dir();
                self.size = if self.is_dir { 0 } else { metadata.len() };
                self.attributes = FileAttributes::from_metadata(&self.path, &metadata);
                self.created = FileTime::from_creation_time(&metadata);
                self.modified = FileTime::from_last_modification_time(&metadata);
                self.accessed = FileTime::from_last_access_time(&metadata);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.exists = false;
                self.is_dir = false;
                self.size = 0;
                self.attributes = FileAttributes::default();
                self.created = None;
                self.modified = FileTime::zero();
                self.accessed = FileTime::zero();
                Ok(())
            }
            Err(e) => Err(EngineError::Probe {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.read_only
    }

    /// Creation time, when the platform records one.
    pub fn created(&self) -> Option<FileTime> {
        self.created
    }

    pub fn modified(&self) -> FileTime {
        self.modified
    }

    pub fn accessed(&self) -> FileTime {
        self.accessed
    }
}
