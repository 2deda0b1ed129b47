//! Name collision handling at a destination.

use std::fs;
use std::path::{Path, PathBuf};

use filedeck_core::{CollisionPolicy, OpsError};

use crate::paths::normalize;

/// Where an incoming item should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Nothing exists at the target.
    Free(PathBuf),
    /// The target was taken; the item goes to a fresh sibling name.
    Renamed { intended: PathBuf, actual: PathBuf },
    /// The existing target must be removed before writing.
    Replace(PathBuf),
}

impl Placement {
    /// The path the item will be written to.
    pub fn target(&self) -> &Path {
        match self {
            Self::Free(path) | Self::Replace(path) => path,
            Self::Renamed { actual, .. } => actual,
        }
    }
}

/// Check whether anything (including a dangling symlink) occupies a path.
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Decide where `source` lands when written to `target`.
///
/// Overwriting an item with itself is never allowed; that case falls back
/// to auto-rename.
pub fn resolve_collision(
    source: &Path,
    target: PathBuf,
    policy: CollisionPolicy,
) -> Result<Placement, OpsError> {
    let policy = match policy {
        CollisionPolicy::Overwrite if normalize(source) == normalize(&target) => {
            CollisionPolicy::AutoRename
        }
        other => other,
    };
    place_output(target, policy)
}

/// Decide where a newly produced file (such as an archive) is written.
pub fn place_output(target: PathBuf, policy: CollisionPolicy) -> Result<Placement, OpsError> {
    if !path_occupied(&target) {
        return Ok(Placement::Free(target));
    }

    match policy {
        CollisionPolicy::Overwrite => Ok(Placement::Replace(target)),
        CollisionPolicy::Skip => Err(OpsError::DestinationCollision { path: target }),
        CollisionPolicy::AutoRename => {
            let actual = auto_rename_path(&target);
            Ok(Placement::Renamed {
                intended: target,
                actual,
            })
        }
    }
}

/// Generate an auto-renamed path to avoid conflicts.
///
/// For "file.txt", tries "file (1).txt", "file (2).txt", etc. and returns
/// the first free candidate. Only the last extension is kept after the
/// counter, so "a.tar.gz" becomes "a.tar (1).gz".
pub fn auto_rename_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u64..)
        .map(|i| {
            let new_name = match &extension {
                Some(ext) => format!("{stem} ({i}).{ext}"),
                None => format!("{stem} ({i})"),
            };
            parent.join(new_name)
        })
        .find(|candidate| !path_occupied(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}
