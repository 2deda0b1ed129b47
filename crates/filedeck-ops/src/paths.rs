//! Lexical path helpers.
//!
//! None of these touch the file system, so they are safe to call from the
//! interactive thread while validating a task.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically, resolving `.` and `..` components.
///
/// `..` never climbs above the root of an absolute path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is `ancestor` itself or lies somewhere beneath it.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    normalize(path).starts_with(normalize(ancestor))
}

/// Build a forward-slash archive entry name from a relative path.
pub fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve an archive entry name beneath `root`.
///
/// Returns `None` for names that are absolute, carry a drive prefix,
/// contain NUL bytes, or climb out of `root` through `..`. A file entry
/// (no trailing slash) that resolves to `root` itself is rejected too.
pub fn resolve_entry(root: &Path, entry_name: &str) -> Option<PathBuf> {
    if entry_name.contains('\0') {
        return None;
    }

    let unified = entry_name.replace('\\', "/");
    let mut depth = 0usize;
    let mut relative = PathBuf::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => {
                depth += 1;
                relative.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                relative.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    // "C:foo" is a plain name on unix but a drive-relative path elsewhere.
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' {
        return None;
    }

    if relative.as_os_str().is_empty() && !unified.ends_with('/') {
        return None;
    }

    Some(root.join(relative))
}
