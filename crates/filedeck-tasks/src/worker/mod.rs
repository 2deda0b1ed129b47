//! The single background worker.
//!
//! A [`TaskWorker`] runs one task on the calling thread (the dispatcher puts
//! it on tokio's blocking pool) and reports through the task's
//! [`ProgressSender`]. Jobs return `Err(OpsError::Cancelled)` when they stop
//! at a checkpoint; the worker turns that into the Cancelled terminal state.

mod archive;
mod transfer;

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use filedeck_core::{OpsError, Task, TaskId, TaskState, WorkerConfig};
use filedeck_ops::WildcardPattern;

use crate::cancel::CancellationToken;
use crate::outcome::{TaskFailure, TaskOutput, TransferSummary};
use crate::progress::{ProgressEvent, ProgressSender, ProgressTracker, TaskEvent};
use crate::search::SearchEngine;

/// Lock-free task state written by the worker and read by handles.
#[derive(Debug)]
pub(crate) struct TaskStatus(AtomicU8);

impl TaskStatus {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(encode(TaskState::Pending)))
    }

    pub(crate) fn get(&self) -> TaskState {
        decode(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(encode(state), Ordering::Release);
    }

    /// Move to a terminal state unless one was already recorded.
    pub(crate) fn finish(&self, state: TaskState) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if decode(current).is_terminal() {
                return false;
            }
            match self.0.compare_exchange(
                current,
                encode(state),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

fn encode(state: TaskState) -> u8 {
    match state {
        TaskState::Pending => 0,
        TaskState::Running => 1,
        TaskState::Cancelling => 2,
        TaskState::Completed => 3,
        TaskState::Cancelled => 4,
        TaskState::Failed => 5,
    }
}

fn decode(value: u8) -> TaskState {
    match value {
        0 => TaskState::Pending,
        1 => TaskState::Running,
        2 => TaskState::Cancelling,
        3 => TaskState::Completed,
        4 => TaskState::Cancelled,
        _ => TaskState::Failed,
    }
}

/// Per-run state shared by every job: cancellation checks and progress.
pub(crate) struct JobContext<'a> {
    token: &'a CancellationToken,
    sender: &'a mut ProgressSender,
    tracker: ProgressTracker,
    config: &'a WorkerConfig,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(
        task_id: TaskId,
        token: &'a CancellationToken,
        sender: &'a mut ProgressSender,
        config: &'a WorkerConfig,
    ) -> Self {
        Self {
            token,
            sender,
            tracker: ProgressTracker::new(task_id),
            config,
        }
    }

    pub(crate) fn config(&self) -> &WorkerConfig {
        self.config
    }

    /// Cancellation checkpoint.
    pub(crate) fn checkpoint(&self) -> Result<(), OpsError> {
        if self.token.is_requested() {
            Err(OpsError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_total(&mut self, total: Option<u64>) {
        self.tracker.set_total(total);
    }

    /// Note the path about to be worked on.
    pub(crate) fn begin(&mut self, path: &Path) {
        self.tracker.set_current_path(path);
    }

    /// Count finished items and publish a snapshot.
    pub(crate) fn items_done(&mut self, count: u64, message: impl Into<String>) {
        self.tracker.record_items(count);
        self.emit(message);
    }

    /// Publish a snapshot with an explicit processed count.
    pub(crate) fn report(&mut self, processed: u64, path: &Path, message: impl Into<String>) {
        self.tracker.advance_to(processed);
        self.tracker.set_current_path(path);
        self.emit(message);
    }

    pub(crate) fn emit(&mut self, message: impl Into<String>) {
        let snapshot = self.tracker.snapshot(message);
        self.sender.progress(snapshot);
    }

    fn snapshot(&self, message: &str) -> ProgressEvent {
        self.tracker.snapshot(message)
    }
}

/// Record a recoverable per-item error; anything else aborts the job.
pub(crate) fn record(
    ctx: &mut JobContext<'_>,
    summary: &mut TransferSummary,
    err: OpsError,
) -> Result<(), OpsError> {
    if !err.is_recoverable() && !matches!(err, OpsError::InvalidTask { .. }) {
        return Err(err);
    }
    tracing::warn!(error = %err, "skipping item");
    summary.record_error(&err);
    ctx.items_done(1, "Skipped");
    Ok(())
}

/// Executes tasks one at a time.
#[derive(Debug, Clone)]
pub(crate) struct TaskWorker {
    config: WorkerConfig,
}

impl TaskWorker {
    pub(crate) fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Run `task` to a terminal state.
    ///
    /// `on_settled` runs after the terminal state is recorded and before the
    /// terminal event is published, so a consumer that sees the event can
    /// submit the next task straight away.
    pub(crate) fn run(
        &self,
        task_id: TaskId,
        task: Task,
        token: CancellationToken,
        mut sender: ProgressSender,
        status: Arc<TaskStatus>,
        on_settled: impl FnOnce(),
    ) {
        status.set(TaskState::Running);
        tracing::info!(task = %task_id, kind = %task.kind(), "task started");

        let (state, event) = {
            let mut ctx = JobContext::new(task_id, &token, &mut sender, &self.config);
            let result = execute(&task, &mut ctx);

            match result {
                Ok(output) => {
                    let snapshot = ctx.snapshot("Done");
                    tracing::info!(task = %task_id, summary = %output.summary(), "task completed");
                    (TaskState::Completed, TaskEvent::Completed { snapshot, output })
                }
                Err(OpsError::Cancelled) => {
                    token.acknowledge();
                    let snapshot = ctx.snapshot("Cancelled");
                    tracing::info!(task = %task_id, processed = snapshot.processed_count, "task cancelled");
                    (TaskState::Cancelled, TaskEvent::Cancelled { snapshot })
                }
                Err(err) => {
                    let snapshot = ctx.snapshot("Failed");
                    let failure = TaskFailure::from_error(
                        &err,
                        ctx.tracker.current_path(),
                        ctx.tracker.processed(),
                    );
                    tracing::warn!(task = %task_id, error = %err, "task failed");
                    (TaskState::Failed, TaskEvent::Failed { snapshot, failure })
                }
            }
        };

        status.finish(state);
        on_settled();
        sender.finish(event);
    }
}

fn execute(task: &Task, ctx: &mut JobContext<'_>) -> Result<TaskOutput, OpsError> {
    match task {
        Task::Search { root, pattern } => {
            let pattern = WildcardPattern::new(pattern)?;
            let engine = SearchEngine::new(ctx.config());
            ctx.begin(root);
            ctx.emit(format!("Searching {}", root.display()));

            let token = ctx.token;
            let result = engine.run(root, &pattern, token, |visited, path| {
                ctx.report(visited, path, "Searching")
            })?;

            ctx.tracker.advance_to(result.entries_visited);
            ctx.set_total(Some(result.entries_visited));
            Ok(TaskOutput::Search(result))
        }
        Task::ZipCreate { inputs, archive } => {
            archive::create(ctx, inputs, archive).map(TaskOutput::Transfer)
        }
        Task::ZipExtract {
            archive,
            destination,
        } => archive::extract(ctx, archive, destination).map(TaskOutput::Transfer),
        Task::BulkCopy {
            inputs,
            destination,
        } => transfer::run(ctx, inputs, destination, transfer::Mode::Copy)
            .map(TaskOutput::Transfer),
        Task::BulkMove {
            inputs,
            destination,
        } => transfer::run(ctx, inputs, destination, transfer::Mode::Move)
            .map(TaskOutput::Transfer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::channel;
    use std::fs;
    use tempfile::TempDir;

    fn run_sync(task: Task, token: CancellationToken) -> Vec<TaskEvent> {
        let (sender, mut receiver) = channel(TaskId::new(1), 1000);
        let status = Arc::new(TaskStatus::new());
        TaskWorker::new(WorkerConfig::default()).run(
            TaskId::new(1),
            task,
            token,
            sender,
            status,
            || {},
        );
        receiver.drain()
    }

    #[test]
    fn test_status_finishes_once() {
        let status = TaskStatus::new();
        assert_eq!(status.get(), TaskState::Pending);
        status.set(TaskState::Running);
        assert!(status.finish(TaskState::Completed));
        assert!(!status.finish(TaskState::Failed));
        assert_eq!(status.get(), TaskState::Completed);
    }

    #[test]
    fn test_cancel_before_first_checkpoint_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();

        let token = CancellationToken::new();
        token.request();
        let events = run_sync(Task::bulk_copy([src.join("a.txt")], &dest), token.clone());

        let last = events.last().unwrap();
        assert!(matches!(last, TaskEvent::Cancelled { .. }));
        assert_eq!(last.processed_count(), 0);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
        assert_eq!(token.state(), crate::cancel::CancelState::Acknowledged);
    }

    #[test]
    fn test_cancelled_zip_create_leaves_no_archive() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let archive = temp.path().join("out.zip");

        let token = CancellationToken::new();
        token.request();
        let events = run_sync(
            Task::zip_create([temp.path().join("a.txt")], &archive),
            token,
        );

        assert!(matches!(events.last(), Some(TaskEvent::Cancelled { .. })));
        assert!(!archive.exists());
    }

    #[test]
    fn test_cancel_during_counting_creates_no_directories() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let dest = temp.path().join("new/dest");
        let archive = temp.path().join("out/archive.zip");

        for task in [
            Task::bulk_copy([temp.path().join("a.txt")], &dest),
            Task::zip_create([temp.path().join("a.txt")], &archive),
        ] {
            let token = CancellationToken::new();
            token.request();
            let events = run_sync(task, token);

            match events.last() {
                Some(TaskEvent::Cancelled { snapshot }) => {
                    // Totals were counted before the stop was honoured.
                    assert_eq!(snapshot.total_estimate, Some(1));
                    assert_eq!(snapshot.processed_count, 0);
                }
                other => panic!("unexpected terminal event {other:?}"),
            }
        }
        assert!(!temp.path().join("new").exists());
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_search_completes_with_total() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();

        let events = run_sync(
            Task::search(temp.path(), "a*"),
            CancellationToken::new(),
        );
        match events.last().unwrap() {
            TaskEvent::Completed {
                snapshot,
                output: TaskOutput::Search(result),
            } => {
                assert_eq!(result.paths, vec![temp.path().join("a.txt")]);
                assert_eq!(snapshot.total_estimate, Some(2));
                assert_eq!(snapshot.processed_count, 2);
            }
            other => panic!("unexpected terminal event {other:?}"),
        }
    }

    #[test]
    fn test_missing_search_root_fails() {
        let temp = TempDir::new().unwrap();
        let events = run_sync(
            Task::search(temp.path().join("gone"), "*"),
            CancellationToken::new(),
        );
        match events.last().unwrap() {
            TaskEvent::Failed { failure, .. } => {
                assert_eq!(failure.kind, filedeck_core::ErrorKind::PathNotFound);
                assert_eq!(failure.path, Some(temp.path().join("gone")));
            }
            other => panic!("unexpected terminal event {other:?}"),
        }
    }
}
