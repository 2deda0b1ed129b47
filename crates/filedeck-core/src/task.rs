//! Background task descriptors.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::OpsError;

/// Unique identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new task ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Search,
    ZipCreate,
    ZipExtract,
    BulkCopy,
    BulkMove,
}

impl TaskKind {
    /// Whether the destination of this kind must be kept outside its inputs.
    pub fn guards_self_containment(&self) -> bool {
        matches!(self, Self::ZipCreate | Self::BulkCopy | Self::BulkMove)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => write!(f, "Search"),
            Self::ZipCreate => write!(f, "Create archive"),
            Self::ZipExtract => write!(f, "Extract archive"),
            Self::BulkCopy => write!(f, "Copy"),
            Self::BulkMove => write!(f, "Move"),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Cancelling => write!(f, "Cancelling"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// A unit of background work.
///
/// Input sets are ordered and deduplicated: the first occurrence of a path
/// wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Find entries under `root` whose name matches `pattern`.
    Search { root: PathBuf, pattern: String },
    /// Pack `inputs` into the archive file `archive`.
    ZipCreate {
        inputs: IndexSet<PathBuf>,
        archive: PathBuf,
    },
    /// Unpack `archive` into the directory `destination`.
    ZipExtract {
        archive: PathBuf,
        destination: PathBuf,
    },
    /// Copy `inputs` into the directory `destination`.
    BulkCopy {
        inputs: IndexSet<PathBuf>,
        destination: PathBuf,
    },
    /// Move `inputs` into the directory `destination`.
    BulkMove {
        inputs: IndexSet<PathBuf>,
        destination: PathBuf,
    },
}

impl Task {
    /// Create a search task.
    pub fn search(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::Search {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    /// Create an archive creation task.
    pub fn zip_create(
        inputs: impl IntoIterator<Item = PathBuf>,
        archive: impl Into<PathBuf>,
    ) -> Self {
        Self::ZipCreate {
            inputs: inputs.into_iter().collect(),
            archive: archive.into(),
        }
    }

    /// Create an archive extraction task.
    pub fn zip_extract(archive: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::ZipExtract {
            archive: archive.into(),
            destination: destination.into(),
        }
    }

    /// Create a bulk copy task.
    pub fn bulk_copy(
        inputs: impl IntoIterator<Item = PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self::BulkCopy {
            inputs: inputs.into_iter().collect(),
            destination: destination.into(),
        }
    }

    /// Create a bulk move task.
    pub fn bulk_move(
        inputs: impl IntoIterator<Item = PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self::BulkMove {
            inputs: inputs.into_iter().collect(),
            destination: destination.into(),
        }
    }

    /// The kind of this task.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Search { .. } => TaskKind::Search,
            Self::ZipCreate { .. } => TaskKind::ZipCreate,
            Self::ZipExtract { .. } => TaskKind::ZipExtract,
            Self::BulkCopy { .. } => TaskKind::BulkCopy,
            Self::BulkMove { .. } => TaskKind::BulkMove,
        }
    }

    /// Input paths in submission order.
    pub fn inputs(&self) -> Vec<&Path> {
        match self {
            Self::Search { root, .. } => vec![root.as_path()],
            Self::ZipExtract { archive, .. } => vec![archive.as_path()],
            Self::ZipCreate { inputs, .. }
            | Self::BulkCopy { inputs, .. }
            | Self::BulkMove { inputs, .. } => inputs.iter().map(PathBuf::as_path).collect(),
        }
    }

    /// Target directory or archive file; `None` for searches.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Search { .. } => None,
            Self::ZipCreate { archive, .. } => Some(archive),
            Self::ZipExtract { destination, .. }
            | Self::BulkCopy { destination, .. }
            | Self::BulkMove { destination, .. } => Some(destination),
        }
    }

    /// Search pattern; `None` for everything but searches.
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::Search { pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    /// Check the descriptor's shape: non-empty absolute inputs, absolute
    /// destination and a non-empty search pattern.
    pub fn check_shape(&self) -> Result<(), OpsError> {
        let inputs = self.inputs();
        if inputs.is_empty() {
            return Err(OpsError::invalid(format!("{} needs at least one input", self.kind())));
        }
        if let Some(relative) = inputs.iter().find(|p| !p.is_absolute()) {
            return Err(OpsError::invalid(format!(
                "input path must be absolute: {}",
                relative.display()
            )));
        }
        if let Some(destination) = self.destination() {
            if !destination.is_absolute() {
                return Err(OpsError::invalid(format!(
                    "destination must be absolute: {}",
                    destination.display()
                )));
            }
        }
        if let Some(pattern) = self.pattern() {
            if pattern.is_empty() {
                return Err(OpsError::invalid("search pattern is empty"));
            }
        }
        Ok(())
    }
}
