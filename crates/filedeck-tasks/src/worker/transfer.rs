//! Bulk copy and move jobs.

use std::path::{Path, PathBuf};

use filedeck_core::{OpsError, TaskKind};
use filedeck_ops::paths::normalize;
use filedeck_ops::{
    copy_file, count_files, create_dir, delete_path, is_dir_link, list_dir, rename_path,
    resolve_collision, EntryKind, Placement,
};
use indexmap::IndexSet;

use super::{record, JobContext};
use crate::outcome::TransferSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    Copy,
    Move,
}

/// Copy or move every input into `destination`.
pub(super) fn run(
    ctx: &mut JobContext<'_>,
    inputs: &IndexSet<PathBuf>,
    destination: &Path,
    mode: Mode,
) -> Result<TransferSummary, OpsError> {
    let kind = match mode {
        Mode::Copy => TaskKind::BulkCopy,
        Mode::Move => TaskKind::BulkMove,
    };
    let mut summary = TransferSummary::new(kind);

    let total: u64 = inputs.iter().map(|input| count_files(input).0).sum();
    ctx.set_total(Some(total));
    ctx.begin(destination);
    ctx.emit("Preparing");
    ctx.checkpoint()?;

    create_dir(destination)?;
    let destination = normalize(destination);
    let policy = ctx.config().collision_policy;

    for input in inputs {
        ctx.checkpoint()?;
        ctx.begin(input);

        let Some(name) = input.file_name() else {
            record(ctx, &mut summary, OpsError::invalid(format!("no file name: {}", input.display())))?;
            continue;
        };

        if mode == Mode::Move && input.parent().map(normalize).as_deref() == Some(destination.as_path()) {
            // Moving into the directory it already lives in.
            let (files, _) = count_files(input);
            summary.succeeded += files;
            ctx.items_done(files, "Already in place");
            continue;
        }

        let placement = match resolve_collision(input, destination.join(name), policy) {
            Ok(placement) => placement,
            Err(e) => {
                record(ctx, &mut summary, e)?;
                continue;
            }
        };

        match &placement {
            Placement::Replace(existing) => {
                if let Err(e) = delete_path(existing) {
                    record(ctx, &mut summary, e)?;
                    continue;
                }
            }
            Placement::Renamed { intended, actual } => {
                tracing::debug!(
                    from = %intended.display(),
                    to = %actual.display(),
                    "destination taken, renaming"
                );
                summary.renamed.push((intended.clone(), actual.clone()));
            }
            Placement::Free(_) => {}
        }

        match mode {
            Mode::Copy => copy_tree(ctx, input, placement.target(), &mut summary)?,
            Mode::Move => move_item(ctx, input, placement.target(), &mut summary)?,
        }
    }

    Ok(summary)
}

/// Recursively copy `source` to `target`, one file per checkpoint.
fn copy_tree(
    ctx: &mut JobContext<'_>,
    source: &Path,
    target: &Path,
    summary: &mut TransferSummary,
) -> Result<(), OpsError> {
    let kind = match EntryKind::of(source) {
        Ok(kind) => kind,
        Err(e) => return record(ctx, summary, e),
    };

    match kind {
        EntryKind::Directory => {
            if let Err(e) = create_dir(target) {
                return record(ctx, summary, e);
            }
            let entries = match list_dir(source) {
                Ok(entries) => entries,
                Err(e) => return record(ctx, summary, e),
            };
            for entry in entries {
                ctx.checkpoint()?;
                copy_tree(ctx, &entry.path, &target.join(&entry.name), summary)?;
            }
            Ok(())
        }
        EntryKind::Symlink if is_dir_link(source) => {
            tracing::debug!(path = %source.display(), "not following directory link");
            Ok(())
        }
        EntryKind::File | EntryKind::Symlink => {
            ctx.begin(source);
            match copy_file(source, target) {
                Ok(bytes) => {
                    summary.succeeded += 1;
                    summary.bytes_processed += bytes;
                    ctx.items_done(1, "Copying");
                    Ok(())
                }
                Err(e) => record(ctx, summary, e),
            }
        }
    }
}

/// Move one input: rename when possible, else copy then delete the source.
fn move_item(
    ctx: &mut JobContext<'_>,
    source: &Path,
    target: &Path,
    summary: &mut TransferSummary,
) -> Result<(), OpsError> {
    let (files, bytes) = count_files(source);

    match rename_path(source, target) {
        Ok(()) => {
            summary.succeeded += files;
            summary.bytes_processed += bytes;
            ctx.items_done(files, "Moving");
            Ok(())
        }
        Err(e @ OpsError::NotFound { .. }) => record(ctx, summary, e),
        Err(e) => {
            tracing::debug!(path = %source.display(), error = %e, "rename failed, copying instead");
            let failed_before = summary.failed;
            copy_tree(ctx, source, target, summary)?;

            if summary.failed == failed_before {
                if let Err(e) = delete_path(source) {
                    record(ctx, summary, e)?;
                }
            } else {
                tracing::warn!(path = %source.display(), "source kept after incomplete copy");
            }
            Ok(())
        }
    }
}
