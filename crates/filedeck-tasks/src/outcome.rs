//! Result payloads carried by terminal task events.

use std::path::{Path, PathBuf};

use filedeck_core::{ErrorKind, ItemError, OpsError, TaskKind};
use serde::{Deserialize, Serialize};

use crate::search::SearchResult;

/// Counts and per-item errors of a finished copy, move or archive task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// The kind of task that produced this summary.
    pub kind: TaskKind,
    /// Files (or archive entries) processed successfully.
    pub succeeded: u64,
    /// Items that were recorded as errors and skipped.
    pub failed: u64,
    /// Bytes written.
    pub bytes_processed: u64,
    /// Recorded per-item errors.
    pub errors: Vec<ItemError>,
    /// Items written under a fresh name as `(intended, actual)`.
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Archive names skipped because an earlier input already used them.
    pub duplicates_skipped: Vec<String>,
}

impl TransferSummary {
    /// Create an empty summary.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            succeeded: 0,
            failed: 0,
            bytes_processed: 0,
            errors: Vec::new(),
            renamed: Vec::new(),
            duplicates_skipped: Vec::new(),
        }
    }

    /// Check if every item went through.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Record a skipped item.
    pub fn record_error(&mut self, err: &OpsError) {
        self.failed += 1;
        self.errors.push(ItemError::from(err));
    }

    /// Count recorded errors of one kind.
    pub fn count_kind(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    /// Get a human-readable summary of the operation.
    pub fn summary(&self) -> String {
        let action = match self.kind {
            TaskKind::BulkCopy => "Copied",
            TaskKind::BulkMove => "Moved",
            TaskKind::ZipCreate => "Archived",
            TaskKind::ZipExtract => "Extracted",
            TaskKind::Search => "Searched",
        };

        let mut line = if self.failed == 0 {
            format!("{} {} items", action, self.succeeded)
        } else {
            format!("{} {} items, {} failed", action, self.succeeded, self.failed)
        };
        if !self.renamed.is_empty() {
            line.push_str(&format!(", {} renamed", self.renamed.len()));
        }
        if !self.duplicates_skipped.is_empty() {
            line.push_str(&format!(
                ", {} duplicate names skipped",
                self.duplicates_skipped.len()
            ));
        }
        line
    }
}

/// Payload of a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutput {
    Search(SearchResult),
    Transfer(TransferSummary),
}

impl TaskOutput {
    /// Human-readable one-liner.
    pub fn summary(&self) -> String {
        match self {
            Self::Search(result) => result.summary(),
            Self::Transfer(summary) => summary.summary(),
        }
    }
}

/// Structured detail of a fatal task error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Error classification.
    pub kind: ErrorKind,
    /// Last attempted path.
    pub path: Option<PathBuf>,
    /// Items completed before the failure.
    pub completed: u64,
    /// Diagnostic message (not meant as user-facing prose).
    pub message: String,
}

impl TaskFailure {
    /// Build a failure from the error that stopped a task.
    pub fn from_error(err: &OpsError, last_path: Option<&Path>, completed: u64) -> Self {
        Self {
            kind: err.kind(),
            path: err.path().or(last_path).map(Path::to_path_buf),
            completed,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "{} at {} after {} items",
                self.kind,
                path.display(),
                self.completed
            ),
            None => write!(f, "{} after {} items", self.kind, self.completed),
        }
    }
}
