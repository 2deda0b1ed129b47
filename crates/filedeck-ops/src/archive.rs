//! ZIP archive primitives: one entry written or extracted per call.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use filedeck_core::{ArchiveCompression, OpsError};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::paths::resolve_entry;

/// Classify a zip error: I/O stays I/O, everything else is a damaged archive.
fn zip_error(path: &Path, err: ZipError) -> OpsError {
    match err {
        ZipError::Io(e) => OpsError::io(path, e),
        other => OpsError::CorruptArchive {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}

/// An archive being written, one entry at a time.
pub struct ZipSink {
    writer: ZipWriter<File>,
    path: PathBuf,
    options: SimpleFileOptions,
    entry_open: bool,
}

impl ZipSink {
    /// Create (or truncate) an archive file.
    pub fn create(path: &Path, compression: ArchiveCompression) -> Result<Self, OpsError> {
        let file = File::create(path).map_err(|e| OpsError::io(path, e))?;
        let method = match compression {
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
            ArchiveCompression::Stored => CompressionMethod::Stored,
        };

        Ok(Self {
            writer: ZipWriter::new(file),
            path: path.to_path_buf(),
            options: SimpleFileOptions::default().compression_method(method),
            entry_open: false,
        })
    }

    /// Add a directory entry (`name` without trailing slash).
    pub fn add_directory(&mut self, name: &str) -> Result<(), OpsError> {
        self.writer
            .add_directory(format!("{name}/"), self.options)
            .map_err(|e| zip_error(&self.path, e))
    }

    /// Add a file entry with the contents of `source`.
    ///
    /// The source is opened before the entry is started, so an unreadable
    /// source never leaves an empty entry behind. If streaming fails midway
    /// the truncated entry is discarded.
    pub fn add_file(&mut self, name: &str, source: &Path) -> Result<u64, OpsError> {
        let mut reader = File::open(source).map_err(|e| OpsError::io(source, e))?;
        let metadata = reader.metadata().map_err(|e| OpsError::io(source, e))?;

        let mut options = self
            .options
            .large_file(metadata.len() >= u64::from(u32::MAX));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(metadata.permissions().mode());
        }

        self.writer
            .start_file(name, options)
            .map_err(|e| zip_error(&self.path, e))?;
        self.entry_open = true;

        match io::copy(&mut reader, &mut self.writer) {
            Ok(bytes) => {
                self.entry_open = false;
                Ok(bytes)
            }
            Err(e) => {
                self.abort_entry();
                let blamed = match e.kind() {
                    io::ErrorKind::StorageFull | io::ErrorKind::WriteZero => self.path.as_path(),
                    _ => source,
                };
                Err(OpsError::io(blamed, e))
            }
        }
    }

    /// Discard the entry currently being written, if any.
    ///
    /// Completed entries are never touched.
    pub fn abort_entry(&mut self) {
        if !std::mem::take(&mut self.entry_open) {
            return;
        }
        if let Err(e) = self.writer.abort_file() {
            tracing::debug!(archive = %self.path.display(), error = %e, "abort_file failed");
        }
    }

    /// Write the central directory and close the archive.
    pub fn finish(self) -> Result<(), OpsError> {
        let Self { writer, path, .. } = self;
        writer.finish().map(|_| ()).map_err(|e| zip_error(&path, e))
    }
}

/// Metadata for one entry of an archive being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the archive.
    pub index: usize,
    /// Raw entry name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Uncompressed size.
    pub size: u64,
}

/// An archive opened for reading.
pub struct ZipSource {
    archive: ZipArchive<File>,
    path: PathBuf,
}

impl ZipSource {
    /// Open an archive and read its central directory.
    pub fn open(path: &Path) -> Result<Self, OpsError> {
        let file = File::open(path).map_err(|e| OpsError::io(path, e))?;
        let archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;
        Ok(Self {
            archive,
            path: path.to_path_buf(),
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Read an entry's metadata without decompressing it.
    pub fn entry(&mut self, index: usize) -> Result<ArchiveEntry, OpsError> {
        let file = self
            .archive
            .by_index_raw(index)
            .map_err(|e| zip_error(&self.path, e))?;
        Ok(ArchiveEntry {
            index,
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            size: file.size(),
        })
    }

    /// Resolve where an entry would be extracted beneath `destination`.
    pub fn target_for(&self, entry: &ArchiveEntry, destination: &Path) -> Result<PathBuf, OpsError> {
        resolve_entry(destination, &entry.name).ok_or_else(|| OpsError::PathTraversal {
            archive: self.path.clone(),
            entry: entry.name.clone(),
        })
    }

    /// Verify that no entry escapes `destination`.
    pub fn check_entries(&mut self, destination: &Path) -> Result<(), OpsError> {
        for index in 0..self.len() {
            let entry = self.entry(index)?;
            self.target_for(&entry, destination)?;
        }
        Ok(())
    }

    /// Extract one entry to `target`, creating parent directories.
    ///
    /// A partially written file is removed when decompression or writing
    /// fails.
    pub fn extract_entry(&mut self, index: usize, target: &Path) -> Result<u64, OpsError> {
        let path = &self.path;
        let mut entry = self.archive.by_index(index).map_err(|e| zip_error(path, e))?;

        if entry.is_dir() {
            fs::create_dir_all(target).map_err(|e| OpsError::io(target, e))?;
            return Ok(0);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| OpsError::io(parent, e))?;
        }

        let mut out = File::create(target).map_err(|e| OpsError::io(target, e))?;
        let written = match io::copy(&mut entry, &mut out) {
            Ok(n) => n,
            Err(e) => {
                drop(out);
                let _ = fs::remove_file(target);
                return Err(match e.kind() {
                    io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                        OpsError::CorruptArchive {
                            path: path.clone(),
                            message: e.to_string(),
                        }
                    }
                    _ => OpsError::io(target, e),
                });
            }
        };

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777));
        }

        Ok(written)
    }
}
