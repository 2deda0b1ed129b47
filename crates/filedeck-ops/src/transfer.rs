//! Single-path copy, rename and delete primitives.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use filedeck_core::OpsError;

use crate::entries::EntryKind;

/// Copy one regular file, returning the number of bytes written.
///
/// A partially written target is removed before the error is returned, so a
/// failed copy never leaves a truncated file behind.
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64, OpsError> {
    let mut reader = File::open(source).map_err(|e| OpsError::io(source, e))?;
    let permissions = reader
        .metadata()
        .map_err(|e| OpsError::io(source, e))?
        .permissions();

    let mut writer = File::create(dest).map_err(|e| OpsError::io(dest, e))?;

    let copied = match io::copy(&mut reader, &mut writer) {
        Ok(n) => n,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(dest);
            return Err(OpsError::io(dest, e));
        }
    };

    if let Err(e) = fs::set_permissions(dest, permissions) {
        tracing::debug!(path = %dest.display(), error = %e, "could not copy permissions");
    }

    Ok(copied)
}

/// Create a directory and any missing parents.
pub fn create_dir(path: &Path) -> Result<(), OpsError> {
    fs::create_dir_all(path).map_err(|e| OpsError::io(path, e))
}

/// Rename a path in place (same file system only).
pub fn rename_path(source: &Path, dest: &Path) -> Result<(), OpsError> {
    fs::rename(source, dest).map_err(|e| {
        if source.exists() {
            OpsError::io(dest, e)
        } else {
            OpsError::io(source, e)
        }
    })
}

/// Permanently delete a file, symlink or directory tree.
pub fn delete_path(path: &Path) -> Result<(), OpsError> {
    let result = match EntryKind::of(path)? {
        EntryKind::Directory => fs::remove_dir_all(path),
        EntryKind::File | EntryKind::Symlink => fs::remove_file(path),
    };
    result.map_err(|e| OpsError::io(path, e))
}
