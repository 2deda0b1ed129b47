//! File system primitives for filedeck.
//!
//! Everything here is synchronous and stateless: enumerate a directory,
//! copy/rename/delete one path, write or extract one archive entry, match a
//! name against a wildcard. Each failure is classified through
//! [`filedeck_core::OpsError`] so the background worker can decide whether
//! to record it and continue or abort the task.

mod archive;
mod conflict;
mod entries;
mod pattern;
mod transfer;

pub mod paths;

pub use archive::{ArchiveEntry, ZipSink, ZipSource};
pub use conflict::{auto_rename_path, path_occupied, place_output, resolve_collision, Placement};
pub use entries::{count_files, is_dir_link, list_dir, DirEntryInfo, EntryKind};
pub use pattern::WildcardPattern;
pub use transfer::{copy_file, create_dir, delete_path, rename_path};
