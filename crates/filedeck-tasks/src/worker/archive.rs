//! Archive creation and extraction jobs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use filedeck_core::{OpsError, TaskKind};
use filedeck_ops::paths::{archive_name, normalize};
use filedeck_ops::{
    count_files, create_dir, delete_path, is_dir_link, list_dir, place_output, resolve_collision,
    EntryKind, Placement, ZipSink, ZipSource,
};
use indexmap::IndexSet;

use super::{record, JobContext};
use crate::outcome::TransferSummary;

/// Pack `inputs` into a new archive at `archive`.
///
/// An existing file at `archive` is handled by the collision policy. Entry
/// names are rooted at each input's parent directory. On cancellation or
/// failure the archive is still finalized with the entries written so far.
pub(super) fn create(
    ctx: &mut JobContext<'_>,
    inputs: &IndexSet<PathBuf>,
    archive: &Path,
) -> Result<TransferSummary, OpsError> {
    let mut summary = TransferSummary::new(TaskKind::ZipCreate);

    let total: u64 = inputs.iter().map(|input| count_files(input).0).sum();
    ctx.set_total(Some(total));
    ctx.begin(archive);
    ctx.emit("Preparing");
    ctx.checkpoint()?;

    if let Some(parent) = archive.parent() {
        create_dir(parent)?;
    }
    let placement = place_output(archive.to_path_buf(), ctx.config().collision_policy)?;
    match &placement {
        Placement::Replace(existing) => delete_path(existing)?,
        Placement::Renamed { intended, actual } => {
            tracing::info!(archive = %actual.display(), "archive name taken, writing to a new name");
            summary.renamed.push((intended.clone(), actual.clone()));
        }
        Placement::Free(_) => {}
    }
    let target = placement.target();
    ctx.begin(target);

    let mut packer = Packer {
        sink: ZipSink::create(target, ctx.config().compression)?,
        archive: normalize(target),
        names: HashSet::new(),
    };

    let walked = packer.add_inputs(ctx, inputs, &mut summary);
    if walked.is_err() {
        packer.sink.abort_entry();
    }
    let finished = packer.sink.finish();

    match (walked, finished) {
        (Ok(()), Ok(())) => Ok(summary),
        (Ok(()), Err(e)) => Err(e),
        (Err(e), finished) => {
            if let Err(finish_err) = finished {
                tracing::warn!(error = %finish_err, "could not finalize partial archive");
            }
            Err(e)
        }
    }
}

struct Packer {
    sink: ZipSink,
    archive: PathBuf,
    names: HashSet<String>,
}

impl Packer {
    fn add_inputs(
        &mut self,
        ctx: &mut JobContext<'_>,
        inputs: &IndexSet<PathBuf>,
        summary: &mut TransferSummary,
    ) -> Result<(), OpsError> {
        for input in inputs {
            ctx.checkpoint()?;
            ctx.begin(input);
            let Some(base) = input.parent() else {
                record(
                    ctx,
                    summary,
                    OpsError::invalid(format!("cannot archive {}", input.display())),
                )?;
                continue;
            };
            self.add_tree(ctx, input, base, summary)?;
        }
        Ok(())
    }

    fn add_tree(
        &mut self,
        ctx: &mut JobContext<'_>,
        path: &Path,
        base: &Path,
        summary: &mut TransferSummary,
    ) -> Result<(), OpsError> {
        if normalize(path) == self.archive {
            tracing::debug!(path = %path.display(), "not adding archive to itself");
            return Ok(());
        }

        let name = archive_name(path.strip_prefix(base).unwrap_or(path));
        let kind = match EntryKind::of(path) {
            Ok(kind) => kind,
            Err(e) => return record(ctx, summary, e),
        };

        match kind {
            EntryKind::Directory => {
                // Overlapping directories merge; only file names can clash.
                if self.names.insert(format!("{name}/")) {
                    self.sink.add_directory(&name)?;
                }
                let entries = match list_dir(path) {
                    Ok(entries) => entries,
                    Err(e) => return record(ctx, summary, e),
                };
                for entry in entries {
                    ctx.checkpoint()?;
                    self.add_tree(ctx, &entry.path, base, summary)?;
                }
                Ok(())
            }
            EntryKind::Symlink if is_dir_link(path) => {
                tracing::debug!(path = %path.display(), "not following directory link");
                Ok(())
            }
            EntryKind::File | EntryKind::Symlink => {
                ctx.begin(path);
                if !self.names.insert(name.clone()) {
                    tracing::debug!(entry = %name, "duplicate archive name skipped");
                    summary.duplicates_skipped.push(name);
                    ctx.items_done(1, "Duplicate skipped");
                    return Ok(());
                }
                match self.sink.add_file(&name, path) {
                    Ok(bytes) => {
                        summary.succeeded += 1;
                        summary.bytes_processed += bytes;
                        ctx.items_done(1, "Compressing");
                        Ok(())
                    }
                    Err(e) => record(ctx, summary, e),
                }
            }
        }
    }
}

/// Unpack `archive` beneath `destination`, one entry per checkpoint.
pub(super) fn extract(
    ctx: &mut JobContext<'_>,
    archive: &Path,
    destination: &Path,
) -> Result<TransferSummary, OpsError> {
    let mut summary = TransferSummary::new(TaskKind::ZipExtract);

    ctx.checkpoint()?;
    ctx.begin(archive);
    let mut source = ZipSource::open(archive)?;
    ctx.set_total(Some(source.len() as u64));
    ctx.emit("Reading archive");

    // The archive may have been replaced since it was submitted.
    source.check_entries(destination)?;
    ctx.checkpoint()?;
    create_dir(destination)?;
    let policy = ctx.config().collision_policy;

    for index in 0..source.len() {
        ctx.checkpoint()?;
        let entry = source.entry(index)?;
        let target = source.target_for(&entry, destination)?;
        ctx.begin(&target);

        if entry.is_dir {
            if target.is_dir() {
                ctx.items_done(1, "Extracting");
                continue;
            }
            match create_dir(&target) {
                Ok(()) => {
                    summary.succeeded += 1;
                    ctx.items_done(1, "Extracting");
                }
                Err(e) => record(ctx, &mut summary, e)?,
            }
            continue;
        }

        let placement = match resolve_collision(archive, target, policy) {
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
                summary.renamed.push((intended.clone(), actual.clone()));
            }
            Placement::Free(_) => {}
        }

        match source.extract_entry(index, placement.target()) {
            Ok(bytes) => {
                summary.succeeded += 1;
                summary.bytes_processed += bytes;
                ctx.items_done(1, "Extracting");
            }
            Err(e) => record(ctx, &mut summary, e)?,
        }
    }

    Ok(summary)
}
