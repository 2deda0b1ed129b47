//! Directory enumeration.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use filedeck_core::OpsError;

/// What kind of entry a path refers to, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    /// Classify a path using `symlink_metadata`.
    pub fn of(path: &Path) -> Result<Self, OpsError> {
        let metadata = fs::symlink_metadata(path).map_err(|e| OpsError::io(path, e))?;
        Ok(Self::from_file_type(metadata.file_type()))
    }

    fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_symlink() {
            Self::Symlink
        } else {
            Self::File
        }
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    /// Full path of the entry.
    pub path: PathBuf,
    /// File name of the entry.
    pub name: OsString,
    /// Entry kind (symlinks are not followed).
    pub kind: EntryKind,
}

/// List a directory's children sorted by name.
///
/// Sorting makes every walk built on top of this deterministic for a given
/// file system snapshot. Children whose type cannot be read are reported as
/// files; the caller's next operation on them surfaces the real error.
pub fn list_dir(dir: &Path) -> Result<Vec<DirEntryInfo>, OpsError> {
    let reader = fs::read_dir(dir).map_err(|e| OpsError::io(dir, e))?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| OpsError::io(dir, e))?;
        let kind = entry
            .file_type()
            .map(EntryKind::from_file_type)
            .unwrap_or(EntryKind::File);
        entries.push(DirEntryInfo {
            path: entry.path(),
            name: entry.file_name(),
            kind,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Whether a symlink points at a directory. Directory links are never
/// followed by walks, which keeps them free of cycles.
pub fn is_dir_link(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Count files and bytes beneath a path (best effort, unreadable parts are
/// ignored).
pub fn count_files(path: &Path) -> (u64, u64) {
    match EntryKind::of(path) {
        Ok(EntryKind::Directory) => {
            let mut files = 0;
            let mut bytes = 0;
            if let Ok(entries) = list_dir(path) {
                for entry in entries {
                    let (f, b) = count_files(&entry.path);
                    files += f;
                    bytes += b;
                }
            }
            (files, bytes)
        }
        Ok(_) => {
            let size = fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0);
            (1, size)
        }
        Err(_) => (0, 0),
    }
}
