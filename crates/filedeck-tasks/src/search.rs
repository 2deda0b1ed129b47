//! Recursive name search.

use std::path::{Path, PathBuf};

use filedeck_core::{OpsError, WorkerConfig};
use filedeck_ops::{is_dir_link, EntryKind, WildcardPattern};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::cancel::CancellationToken;

/// Matches found by a search task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched paths in traversal order.
    pub paths: Vec<PathBuf>,
    /// Entries looked at (files, directories and links).
    pub entries_visited: u64,
    /// Directories that could not be listed.
    pub dirs_skipped: u64,
    /// Whether the walk stopped because the result cap was reached.
    pub truncated: bool,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Get a human-readable summary of the search.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Found {} matches in {} entries",
            self.paths.len(),
            self.entries_visited
        );
        if self.truncated {
            line.push_str(" (limit reached)");
        }
        if self.dirs_skipped > 0 {
            line.push_str(&format!(", {} directories unreadable", self.dirs_skipped));
        }
        line
    }
}

/// Depth-first walker matching entry names against a wildcard.
///
/// Entries of each directory are visited in name order, so the result order
/// is stable for a given tree. Symlinked directories are reported when they
/// match but never entered.
pub(crate) struct SearchEngine {
    max_results: usize,
    progress_interval: u64,
}

impl SearchEngine {
    pub(crate) fn new(config: &WorkerConfig) -> Self {
        Self {
            max_results: config.max_search_results.max(1),
            progress_interval: config.progress_interval.max(1) as u64,
        }
    }

    /// Walk `root`, calling `emit(entries_visited, current_path)` every
    /// `progress_interval` entries.
    ///
    /// The token is checked before the walk and whenever a directory is
    /// about to be expanded; a requested token ends the walk with
    /// [`OpsError::Cancelled`].
    pub(crate) fn run(
        &self,
        root: &Path,
        pattern: &WildcardPattern,
        token: &CancellationToken,
        mut emit: impl FnMut(u64, &Path),
    ) -> Result<SearchResult, OpsError> {
        match EntryKind::of(root)? {
            EntryKind::Directory => {}
            EntryKind::Symlink if is_dir_link(root) => {}
            _ => {
                return Err(OpsError::invalid(format!(
                    "search root is not a directory: {}",
                    root.display()
                )));
            }
        }

        if token.is_requested() {
            return Err(OpsError::Cancelled);
        }

        let mut result = SearchResult::default();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(walk_error(root, e)),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable directory");
                    result.dirs_skipped += 1;
                    continue;
                }
            };
            result.entries_visited += 1;

            if pattern.matches(entry.file_name()) {
                result.paths.push(entry.path().to_path_buf());
                if result.paths.len() >= self.max_results {
                    result.truncated = true;
                    emit(result.entries_visited, entry.path());
                    return Ok(result);
                }
            }

            if result.entries_visited % self.progress_interval == 0 {
                emit(result.entries_visited, entry.path());
            }

            // Children are yielded after their directory; stop before them.
            if entry.file_type().is_dir() && token.is_requested() {
                return Err(OpsError::Cancelled);
            }
        }

        Ok(result)
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> OpsError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(io) => OpsError::io(path, io),
        None => OpsError::invalid(format!("cannot walk {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.TXT"), "b").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/a.txt"), "a").unwrap();
        temp
    }

    fn engine(max_results: usize, progress_interval: usize) -> SearchEngine {
        let config = WorkerConfig::builder()
            .max_search_results(max_results)
            .progress_interval(progress_interval)
            .build()
            .unwrap();
        SearchEngine::new(&config)
    }

    #[test]
    fn test_matches_in_traversal_order() {
        let temp = fixture();
        let pattern = WildcardPattern::new("a.*").unwrap();
        let token = CancellationToken::new();

        let result = engine(100, 50)
            .run(temp.path(), &pattern, &token, |_, _| {})
            .unwrap();

        assert_eq!(
            result.paths,
            vec![temp.path().join("a.txt"), temp.path().join("sub/a.txt")]
        );
        assert_eq!(result.entries_visited, 4);
        assert!(!result.truncated);
    }

    #[test]
    fn test_case_insensitive() {
        let temp = fixture();
        let pattern = WildcardPattern::new("*.txt").unwrap();
        let result = engine(100, 50)
            .run(temp.path(), &pattern, &CancellationToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_cap_stops_walk() {
        let temp = fixture();
        let pattern = WildcardPattern::new("a.*").unwrap();
        let result = engine(1, 50)
            .run(temp.path(), &pattern, &CancellationToken::new(), |_, _| {})
            .unwrap();

        assert_eq!(result.paths, vec![temp.path().join("a.txt")]);
        assert!(result.truncated);
        assert_eq!(result.entries_visited, 1);
    }

    #[test]
    fn test_progress_interval() {
        let temp = fixture();
        let pattern = WildcardPattern::new("nothing").unwrap();
        let mut counts = Vec::new();
        engine(100, 2)
            .run(temp.path(), &pattern, &CancellationToken::new(), |n, _| counts.push(n))
            .unwrap();
        assert_eq!(counts, vec![2, 4]);
    }

    #[test]
    fn test_cancelled_before_walk() {
        let temp = fixture();
        let pattern = WildcardPattern::new("*").unwrap();
        let token = CancellationToken::new();
        token.request();

        let err = engine(100, 50)
            .run(temp.path(), &pattern, &token, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, OpsError::Cancelled));
    }

    #[test]
    fn test_root_errors() {
        let temp = fixture();
        let pattern = WildcardPattern::new("*").unwrap();
        let token = CancellationToken::new();

        let err = engine(100, 50)
            .run(&temp.path().join("missing"), &pattern, &token, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), filedeck_core::ErrorKind::PathNotFound);

        let err = engine(100, 50)
            .run(&temp.path().join("a.txt"), &pattern, &token, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), filedeck_core::ErrorKind::InvalidTask);
    }

    #[test]
    fn test_cancelled_between_directories() {
        let temp = fixture();
        let pattern = WildcardPattern::new("*").unwrap();
        let token = CancellationToken::new();

        // Cancel once the walk reaches "sub", before it is listed.
        let err = engine(100, 1)
            .run(temp.path(), &pattern, &token, |_, path| {
                if path.ends_with("sub") {
                    token.request();
                }
            })
            .unwrap_err();
        assert!(matches!(err, OpsError::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_dirs_are_skipped_and_counted() {
        use std::os::unix::fs::PermissionsExt;

        let temp = fixture();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("a.txt"), "hidden").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running as root: permissions are not enforced.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let pattern = WildcardPattern::new("a.*").unwrap();
        let result = engine(100, 50)
            .run(temp.path(), &pattern, &CancellationToken::new(), |_, _| {});
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let result = result.unwrap();
        assert_eq!(result.dirs_skipped, 1);
        assert_eq!(
            result.paths,
            vec![temp.path().join("a.txt"), temp.path().join("sub/a.txt")]
        );
        assert!(result.summary().contains("1 directories unreadable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_dirs_not_followed() {
        let temp = fixture();
        std::os::unix::fs::symlink(temp.path(), temp.path().join("loop")).unwrap();
        let pattern = WildcardPattern::new("a.txt").unwrap();

        let result = engine(100, 50)
            .run(temp.path(), &pattern, &CancellationToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(result.len(), 2);
    }
}
