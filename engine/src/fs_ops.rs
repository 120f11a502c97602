//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating the source files of a run
//! - Deriving mirrored target paths
//! - Creating mirrored directories and applying their source metadata
//! - Copying timestamps and attributes between paths

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::EngineError;
use crate::probe::MetadataSnapshot;

/// Files selected from a source path, plus the root their target paths are
/// made relative to.
#[derive(Debug, Clone)]
pub struct SourceSet {
    /// Directory whose prefix is replaced by the target root
    pub relative_root: PathBuf,
    /// Regular files in enumeration order
    pub files: Vec<PathBuf>,
}

/// Enumerate the candidate files of an absolute source path.
///
/// A file source yields itself with its parent as the relative root. A
/// directory source yields every regular file beneath it (or only the top
/// level when `recursive` is false), visited in file-name order.
///
/// # Errors
/// Returns EngineError if the source is missing or its root cannot be read.
/// Unreadable subdirectories are logged and skipped.
pub fn enumerate_sources(source: &Path, recursive: bool) -> Result<SourceSet, EngineError> {
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(EngineError::SourceAccessDenied {
                path: source.to_path_buf(),
                source: e,
            });
        }
    };

    if !metadata.is_dir() {
        let relative_root = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        return Ok(SourceSet {
            relative_root,
            files: vec![source.to_path_buf()],
        });
    }

    fn recurse(path: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<(), EngineError> {
        let entries = fs::read_dir(path).map_err(|e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut entries: Vec<_> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let entry_path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::warn!(path = %entry_path.display(), error = %e, "Skipping entry");
                    continue;
                }
            };

            if file_type.is_dir() {
                if recursive {
                    if let Err(e) = recurse(&entry_path, recursive, files) {
                        tracing::warn!(error = %e.detailed_message(), "Skipping subdirectory");
                    }
                }
            } else if file_type.is_file() {
                files.push(entry_path);
            } else if file_type.is_symlink() {
                // Links are followed only when they resolve to a regular file
                if fs::metadata(&entry_path).map(|m| m.is_file()).unwrap_or(false) {
                    files.push(entry_path);
                }
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    recurse(source, recursive, &mut files)?;
    Ok(SourceSet {
        relative_root: source.to_path_buf(),
        files,
    })
}

/// Replace the `relative_root` prefix of `source_file` with `target_root`.
pub fn mirror_target_path(source_file: &Path, relative_root: &Path, target_root: &Path) -> PathBuf {
    target_root.join(relative_part(source_file, relative_root))
}

fn relative_part<'a>(source_file: &'a Path, relative_root: &Path) -> &'a Path {
    match source_file.strip_prefix(relative_root) {
        Ok(relative) => relative,
        Err(_) => source_file
            .file_name()
            .map(Path::new)
            .unwrap_or(source_file),
    }
}

/// A target directory created during a run, paired with the source directory
/// whose metadata it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDir {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Create the target directories between `target_root` and the mirrored
/// target of `source_file`.
///
/// Only levels that did not exist are created, with default permissions so
/// the files of a read-only source directory can still be written into them.
/// Source metadata is applied later by [`sync_created_dirs`]. The target root
/// itself is never touched.
///
/// # Returns
/// The directories created, shallowest first
///
/// # Errors
/// Returns EngineError if a directory cannot be created
pub fn create_mirrored_dirs(
    source_file: &Path,
    relative_root: &Path,
    target_root: &Path,
) -> Result<Vec<CreatedDir>, EngineError> {
    let relative_dir = match relative_part(source_file, relative_root).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => return Ok(Vec::new()),
    };

    let mut created = Vec::new();
    let mut level = PathBuf::new();
    for component in relative_dir.components() {
        level.push(component);
        let target_dir = target_root.join(&level);
        if target_dir.is_dir() {
            continue;
        }
        fs::create_dir(&target_dir).map_err(|e| EngineError::DirectoryCreationFailed {
            path: target_dir.clone(),
            source: e,
        })?;
        tracing::debug!(dir = %target_dir.display(), "Created directory");
        created.push(CreatedDir {
            source: relative_root.join(&level),
            target: target_dir,
        });
    }

    Ok(created)
}

/// Copy source timestamps and attributes onto directories created during a
/// run, once nothing else will be written into them.
///
/// `dirs` is in creation order; a child is always created after its parent,
/// so walking it backwards finishes every child before its parent and the
/// parent's modification time is not disturbed afterwards.
///
/// # Returns
/// The number of directories whose metadata could not be copied. Each failure
/// is logged.
pub fn sync_created_dirs(dirs: &[CreatedDir]) -> usize {
    let mut failures = 0;
    for dir in dirs.iter().rev() {
        if let Err(e) = sync_metadata(&dir.source, &dir.target) {
            failures += 1;
            tracing::warn!(
                dir = %dir.target.display(),
                error = %e.detailed_message(),
                "Could not copy directory metadata"
            );
        }
    }
    failures
}

/// Ensure a directory exists, creating it and its ancestors if necessary.
///
/// # Errors
/// Returns EngineError if the path exists but is not a directory, or creation
/// fails
pub fn ensure_dir_exists(path: &Path) -> Result<(), EngineError> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            tracing::debug!(dir = %path.display(), "Created directory");
            Ok(())
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Copy timestamps, then attributes, from `source` to `target`.
///
/// Times go first: a read-only target may refuse time changes on some
/// platforms.
pub fn sync_metadata(source: &Path, target: &Path) -> Result<(), EngineError> {
    copy_times(source, target)?;
    copy_attributes(source, target)
}

/// Copy access, modification and (where it can be set) creation times.
///
/// Creation time can only be written on Windows; elsewhere it is left alone.
pub fn copy_times(source: &Path, target: &Path) -> Result<(), EngineError> {
    let snapshot = MetadataSnapshot::probe(source)?;
    if !snapshot.exists() {
        return Err(EngineError::ReadError {
            path: source.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "Source disappeared"),
        });
    }

    filetime::set_file_times(target, snapshot.accessed(), snapshot.modified()).map_err(|e| {
        EngineError::WriteError {
            path: target.to_path_buf(),
            source: e,
        }
    })?;

    match snapshot.created() {
        Some(created) => set_creation_time(target, created).map_err(|e| EngineError::WriteError {
            path: target.to_path_buf(),
            source: e,
        }),
        None => Ok(()),
    }
}

#[cfg(windows)]
fn set_creation_time(target: &Path, created: FileTime) -> io::Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::{FileTimesExt, OpenOptionsExt};
    use std::time::{Duration, UNIX_EPOCH};

    const FILE_WRITE_ATTRIBUTES: u32 = 0x100;
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

    let nanos = Duration::from_nanos(u64::from(created.nanoseconds()));
    let time = match u64::try_from(created.unix_seconds()) {
        Ok(secs) => UNIX_EPOCH + Duration::from_secs(secs) + nanos,
        Err(_) => UNIX_EPOCH - Duration::from_secs(created.unix_seconds().unsigned_abs()) + nanos,
    };

    // Backup semantics lets the same call open directories.
    let file = OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(target)?;
    file.set_times(FileTimes::new().set_created(time))
}

#[cfg(not(windows))]
fn set_creation_time(_target: &Path, _created: FileTime) -> io::Result<()> {
    Ok(())
}

/// Copy attributes: the read-only, hidden, system, archive and related bits
/// on Windows, the permission mode elsewhere.
#[cfg(windows)]
pub fn copy_attributes(source: &Path, target: &Path) -> Result<(), EngineError> {
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::fs::MetadataExt;
    use windows_sys::Win32::Storage::FileSystem::{
        SetFileAttributesW, FILE_ATTRIBUTE_ARCHIVE, FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_NORMAL,
        FILE_ATTRIBUTE_NOT_CONTENT_INDEXED, FILE_ATTRIBUTE_OFFLINE, FILE_ATTRIBUTE_READONLY,
        FILE_ATTRIBUTE_SYSTEM, FILE_ATTRIBUTE_TEMPORARY,
    };

    const SETTABLE: u32 = FILE_ATTRIBUTE_READONLY
        | FILE_ATTRIBUTE_HIDDEN
        | FILE_ATTRIBUTE_SYSTEM
        | FILE_ATTRIBUTE_ARCHIVE
        | FILE_ATTRIBUTE_TEMPORARY
        | FILE_ATTRIBUTE_OFFLINE
        | FILE_ATTRIBUTE_NOT_CONTENT_INDEXED;

    let metadata = fs::metadata(source).map_err(|e| EngineError::ReadError {
        path: source.to_path_buf(),
        source: e,
    })?;
    let bits = match metadata.file_attributes() & SETTABLE {
        0 => FILE_ATTRIBUTE_NORMAL,
        bits => bits,
    };

    let wide: Vec<u16> = target.as_os_str().encode_wide().chain(Some(0)).collect();
    // SAFETY: `wide` is a NUL-terminated UTF-16 path that outlives the call.
    let ok = unsafe { SetFileAttributesW(wide.as_ptr(), bits) };
    if ok == 0 {
        return Err(EngineError::WriteError {
            path: target.to_path_buf(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Copy attributes: the permission mode. Hidden files are dot-files here, so
/// the mirrored name already carries that attribute; there is no system bit.
#[cfg(not(windows))]
pub fn copy_attributes(source: &Path, target: &Path) -> Result<(), EngineError> {
    let metadata = fs::metadata(source).map_err(|e| EngineError::ReadError {
        path: source.to_path_buf(),
        source: e,
    })?;
    fs::set_permissions(target, metadata.permissions()).map_err(|e| EngineError::WriteError {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Set or clear the read-only flag of `path`.
///
/// On Unix only the owner write bit is touched.
pub fn set_read_only(path: &Path, read_only: bool) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        permissions.set_mode(if read_only { mode & !0o222 } else { mode | 0o200 });
    }

    #[cfg(not(unix))]
    permissions.set_readonly(read_only);

    fs::set_permissions(path, permissions)
}

/// Best-effort removal of a partially written target.
pub fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Could not remove partial target");
        }
    }
}
