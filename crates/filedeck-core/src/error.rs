//! Error taxonomy for file operations and background tasks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, independent of the path or message.
///
/// The interactive shell renders messages from this plus the structured
/// fields of the event that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Permission was denied.
    PermissionDenied,
    /// Path does not exist.
    PathNotFound,
    /// Something already exists where the item should land.
    DestinationCollision,
    /// The destination lies inside one of the task's own inputs.
    DestinationInsideSource,
    /// The target filesystem ran out of space.
    DiskFull,
    /// An archive could not be read.
    CorruptArchive,
    /// An archive entry would be written outside the destination.
    PathTraversalRejected,
    /// The task was cancelled.
    Cancelled,
    /// The task descriptor is malformed.
    InvalidTask,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::PathNotFound => write!(f, "Path not found"),
            Self::DestinationCollision => write!(f, "Destination already exists"),
            Self::DestinationInsideSource => write!(f, "Destination is inside a source"),
            Self::DiskFull => write!(f, "Disk full"),
            Self::CorruptArchive => write!(f, "Corrupt archive"),
            Self::PathTraversalRejected => write!(f, "Archive entry escapes destination"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::InvalidTask => write!(f, "Invalid task"),
            Self::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// Errors produced by file operations.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Destination already exists and the collision policy refused it.
    #[error("Destination already exists: {path}")]
    DestinationCollision { path: PathBuf },

    /// Destination lies inside (or is) one of the inputs.
    #[error("Destination {destination} lies inside source {input}")]
    DestinationInsideSource { input: PathBuf, destination: PathBuf },

    /// No space left on the target filesystem.
    #[error("Disk full while writing {path}")]
    DiskFull { path: PathBuf },

    /// The archive is unreadable or damaged.
    #[error("Corrupt archive {path}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    /// An archive entry name resolves outside the extraction root.
    #[error("Archive {archive} contains unsafe entry {entry:?}")]
    PathTraversal { archive: PathBuf, entry: String },

    /// The operation observed a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// The task descriptor is malformed.
    #[error("Invalid task: {message}")]
    InvalidTask { message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OpsError {
    /// Create an I/O error with path context, classifying well-known kinds.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::DestinationCollision { path },
            std::io::ErrorKind::StorageFull => Self::DiskFull { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid-task error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidTask {
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::PathNotFound,
            Self::DestinationCollision { .. } => ErrorKind::DestinationCollision,
            Self::DestinationInsideSource { .. } => ErrorKind::DestinationInsideSource,
            Self::DiskFull { .. } => ErrorKind::DiskFull,
            Self::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            Self::PathTraversal { .. } => ErrorKind::PathTraversalRejected,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidTask { .. } => ErrorKind::InvalidTask,
            Self::Io { .. } => ErrorKind::Unknown,
        }
    }

    /// The path the error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::DestinationCollision { path }
            | Self::DiskFull { path }
            | Self::CorruptArchive { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::DestinationInsideSource { destination, .. } => Some(destination),
            Self::PathTraversal { archive, .. } => Some(archive),
            Self::Cancelled | Self::InvalidTask { .. } => None,
        }
    }

    /// Whether a recursive operation may record this error and move on to
    /// the next item.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermissionDenied | ErrorKind::PathNotFound | ErrorKind::DestinationCollision
        )
    }
}

/// A per-item error recorded by a best-effort operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// Classification of the error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
}

impl From<&OpsError> for ItemError {
    fn from(err: &OpsError) -> Self {
        Self {
            path: err.path().map(Path::to_path_buf).unwrap_or_default(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
