//! Interactive-thread entry point to the background worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use filedeck_core::{ErrorKind, OpsError, Task, TaskId, TaskKind, TaskState, WorkerConfig};
use filedeck_ops::paths::is_within;
use filedeck_ops::{WildcardPattern, ZipSource};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::cancel::{CancelState, CancellationToken};
use crate::progress::{self, ProgressReceiver, TaskEvent};
use crate::worker::{TaskStatus, TaskWorker};

/// Why a task was not accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Another task is Running or Cancelling.
    #[error("another task is still running")]
    Busy,

    /// The dispatcher was shut down.
    #[error("task dispatcher is shut down")]
    ShutDown,

    /// The descriptor failed validation.
    #[error(transparent)]
    Invalid(#[from] OpsError),
}

impl SubmitError {
    /// Error classification for rejected descriptors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Invalid(err) => Some(err.kind()),
            Self::Busy | Self::ShutDown => None,
        }
    }
}

/// Holds the single worker slot; released on drop.
#[derive(Debug)]
pub(crate) struct SlotGuard(Arc<AtomicBool>);

impl SlotGuard {
    pub(crate) fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(busy)))
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Check a descriptor before it is handed to the worker.
///
/// Besides the shape checks this rejects destinations inside an input and,
/// for extraction, archives containing entries that would escape the
/// destination. The latter reads the archive's central directory.
pub fn validate(task: &Task) -> Result<(), OpsError> {
    task.check_shape()?;

    match task {
        Task::Search { pattern, .. } => {
            WildcardPattern::new(pattern)?;
        }
        Task::ZipExtract {
            archive,
            destination,
        } => {
            ZipSource::open(archive)?.check_entries(destination)?;
        }
        Task::ZipCreate { .. } | Task::BulkCopy { .. } | Task::BulkMove { .. } => {}
    }

    if task.kind().guards_self_containment() {
        if let Some(destination) = task.destination() {
            if let Some(input) = task.inputs().into_iter().find(|input| is_within(destination, input)) {
                return Err(OpsError::DestinationInsideSource {
                    input: input.to_path_buf(),
                    destination: destination.to_path_buf(),
                });
            }
        }
    }

    Ok(())
}

/// Accepts tasks and runs them one at a time on tokio's blocking pool.
#[derive(Debug)]
pub struct TaskDispatcher {
    worker: TaskWorker,
    channel_capacity: usize,
    runtime: Handle,
    busy: Arc<AtomicBool>,
    next_id: AtomicU64,
    shutdown: tokio_util::sync::CancellationToken,
}

impl TaskDispatcher {
    /// Create a dispatcher bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: WorkerConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a dispatcher that spawns its worker on `runtime`.
    pub fn with_runtime(config: WorkerConfig, runtime: Handle) -> Self {
        let config = config.sanitized();
        Self {
            channel_capacity: config.channel_capacity,
            worker: TaskWorker::new(config),
            runtime,
            busy: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
            shutdown: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Validate `task` and start it on the worker.
    ///
    /// Fails with [`SubmitError::Busy`] while another task is Running or
    /// Cancelling and with [`SubmitError::Invalid`] when validation rejects
    /// the descriptor. Never blocks on the running task.
    pub fn submit(&self, task: Task) -> Result<TaskHandle, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::ShutDown);
        }
        let slot = SlotGuard::acquire(&self.busy).ok_or(SubmitError::Busy)?;
        validate(&task)?;

        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let kind = task.kind();
        let token = CancellationToken::child_of(&self.shutdown);
        let status = Arc::new(TaskStatus::new());
        let (sender, receiver) = progress::channel(id, self.channel_capacity);

        tracing::debug!(task = %id, kind = %kind, "task submitted");

        let worker = self.worker.clone();
        let worker_token = token.clone();
        let worker_status = Arc::clone(&status);
        self.runtime.spawn_blocking(move || {
            worker.run(id, task, worker_token, sender, worker_status, move || drop(slot));
        });

        Ok(TaskHandle {
            id,
            kind,
            token,
            status,
            receiver,
        })
    }

    /// All events of `handle` since the previous poll, in order.
    pub fn poll(&self, handle: &mut TaskHandle) -> Vec<TaskEvent> {
        handle.poll()
    }

    /// Ask the task behind `handle` to stop. Idempotent; returns `true` only
    /// for the call that made the Clear → Requested transition.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        handle.cancel()
    }

    /// Whether a task currently occupies the worker.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Request cancellation of the active task and refuse new submissions.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!("task dispatcher shutting down");
            self.shutdown.cancel();
        }
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The interactive thread's view of one submitted task.
///
/// Each handle owns its task's event channel, so events of one task can
/// never show up on another task's handle.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    kind: TaskKind,
    token: CancellationToken,
    status: Arc<TaskStatus>,
    receiver: ProgressReceiver,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Current lifecycle state. A live task whose token was requested
    /// reports `Cancelling` until the worker records the terminal state.
    pub fn state(&self) -> TaskState {
        match self.status.get() {
            TaskState::Pending | TaskState::Running if self.token.is_requested() => {
                TaskState::Cancelling
            }
            state => state,
        }
    }

    /// State of the task's cancellation token.
    pub fn cancel_state(&self) -> CancelState {
        self.token.state()
    }

    /// Whether the terminal event has been returned by [`poll`](Self::poll).
    pub fn is_finished(&self) -> bool {
        self.receiver.is_closed()
    }

    /// All events since the previous poll, in order. Never blocks.
    pub fn poll(&mut self) -> Vec<TaskEvent> {
        let events = self.receiver.drain();
        if let Some(last) = events.last() {
            let terminal = match last {
                TaskEvent::Progress(_) => None,
                TaskEvent::Completed { .. } => Some(TaskState::Completed),
                TaskEvent::Cancelled { .. } => Some(TaskState::Cancelled),
                TaskEvent::Failed { .. } => Some(TaskState::Failed),
            };
            // Covers a worker that died before recording its state.
            if let Some(state) = terminal {
                self.status.finish(state);
            }
        }
        events
    }

    /// Ask the task to stop. No-op once the task is terminal.
    pub fn cancel(&self) -> bool {
        if self.status.get().is_terminal() {
            return false;
        }
        let requested = self.token.request();
        if requested {
            tracing::debug!(task = %self.id, "cancellation requested");
        }
        requested
    }

    /// Poll every `tick` until the terminal event arrives and return every
    /// event seen on the way.
    pub async fn wait_terminal(&mut self, tick: Duration) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        let mut interval = tokio::time::interval(tick);
        while !self.is_finished() {
            interval.tick().await;
            events.extend(self.poll());
        }
        events
    }
}
