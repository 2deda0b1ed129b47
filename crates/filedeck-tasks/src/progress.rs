//! Progress reporting from the worker to the interactive thread.
//!
//! Each task gets its own channel pair. Progress snapshots travel over a
//! bounded mpsc queue that the worker only ever `try_send`s into: when the
//! queue is full the newest snapshot is held back and superseded by the
//! next one, so a slow consumer sees fewer events but never blocks the
//! worker. The terminal event travels over a one-shot slot of its own and
//! cannot be lost to backpressure.

use std::path::{Path, PathBuf};

use filedeck_core::{ErrorKind, TaskId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::outcome::{TaskFailure, TaskOutput};

/// Immutable progress snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task this snapshot belongs to.
    pub task_id: TaskId,
    /// Items processed so far. Never decreases within a task.
    pub processed_count: u64,
    /// Expected item count, if known.
    pub total_estimate: Option<u64>,
    /// The path most recently worked on.
    pub current_path: Option<PathBuf>,
    /// Short status line.
    pub message: String,
}

impl ProgressEvent {
    /// Get the progress as a percentage (0.0 to 100.0), if a total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_estimate {
            Some(0) => Some(100.0),
            Some(total) => Some((self.processed_count as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// Everything `poll` can yield for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    /// Intermediate snapshot.
    Progress(ProgressEvent),
    /// The task ran to the end.
    Completed {
        snapshot: ProgressEvent,
        output: TaskOutput,
    },
    /// The task stopped at a checkpoint after a cancel request.
    Cancelled { snapshot: ProgressEvent },
    /// The task hit an unrecoverable error.
    Failed {
        snapshot: ProgressEvent,
        failure: TaskFailure,
    },
}

impl TaskEvent {
    /// Whether this is the last event of its task.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    /// The progress snapshot carried by this event.
    pub fn snapshot(&self) -> &ProgressEvent {
        match self {
            Self::Progress(snapshot)
            | Self::Completed { snapshot, .. }
            | Self::Cancelled { snapshot }
            | Self::Failed { snapshot, .. } => snapshot,
        }
    }

    /// Shorthand for `snapshot().processed_count`.
    pub fn processed_count(&self) -> u64 {
        self.snapshot().processed_count
    }
}

/// Create the channel pair for one task.
pub(crate) fn channel(task_id: TaskId, capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (progress_tx, progress_rx) = mpsc::channel(capacity.max(1));
    let (terminal_tx, terminal_rx) = oneshot::channel();

    let sender = ProgressSender {
        progress: progress_tx,
        held: None,
        terminal: Some(terminal_tx),
    };
    let receiver = ProgressReceiver {
        task_id,
        progress: progress_rx,
        terminal: Some(terminal_rx),
        last: None,
    };
    (sender, receiver)
}

/// Worker half of a task's channel. Never blocks.
#[derive(Debug)]
pub(crate) struct ProgressSender {
    progress: mpsc::Sender<ProgressEvent>,
    held: Option<ProgressEvent>,
    terminal: Option<oneshot::Sender<TaskEvent>>,
}

impl ProgressSender {
    /// Publish a snapshot, coalescing with any snapshot held back earlier.
    pub(crate) fn progress(&mut self, event: ProgressEvent) {
        // A newer snapshot supersedes whatever was waiting for room.
        self.held = None;
        match self.progress.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => self.held = Some(event),
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Publish the terminal event. Only the first call has any effect.
    pub(crate) fn finish(&mut self, event: TaskEvent) {
        if let Some(held) = self.held.take() {
            // If there is still no room the terminal snapshot covers it.
            let _ = self.progress.try_send(held);
        }
        if let Some(terminal) = self.terminal.take() {
            if terminal.send(event).is_err() {
                tracing::debug!("terminal event dropped: receiver gone");
            }
        }
    }
}

/// Interactive half of a task's channel.
#[derive(Debug)]
pub(crate) struct ProgressReceiver {
    task_id: TaskId,
    progress: mpsc::Receiver<ProgressEvent>,
    terminal: Option<oneshot::Receiver<TaskEvent>>,
    last: Option<ProgressEvent>,
}

impl ProgressReceiver {
    /// Take every event available right now, in order.
    ///
    /// Once the terminal event has been returned, later calls return
    /// nothing. A worker that went away without a terminal event (it
    /// panicked) is reported as a synthetic `Failed { Unknown }`.
    pub(crate) fn drain(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        if self.terminal.is_none() {
            return events;
        }

        self.drain_progress(&mut events);

        let received = match self.terminal.as_mut() {
            Some(terminal) => terminal.try_recv(),
            None => return events,
        };
        let finished = match received {
            Ok(event) => Some(event),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(self.lost_worker()),
        };

        if let Some(event) = finished {
            // Progress sent right before the terminal event may have landed
            // after the first pass.
            self.drain_progress(&mut events);
            events.push(event);
            self.terminal = None;
        }
        events
    }

    /// Whether the terminal event has been handed out.
    pub(crate) fn is_closed(&self) -> bool {
        self.terminal.is_none()
    }

    fn drain_progress(&mut self, events: &mut Vec<TaskEvent>) {
        while let Ok(event) = self.progress.try_recv() {
            self.last = Some(event.clone());
            events.push(TaskEvent::Progress(event));
        }
    }

    fn lost_worker(&self) -> TaskEvent {
        let snapshot = self.last.clone().unwrap_or_else(|| ProgressEvent {
            task_id: self.task_id,
            processed_count: 0,
            total_estimate: None,
            current_path: None,
            message: String::new(),
        });
        let failure = TaskFailure {
            kind: ErrorKind::Unknown,
            path: snapshot.current_path.clone(),
            completed: snapshot.processed_count,
            message: "worker stopped without reporting a result".to_string(),
        };
        TaskEvent::Failed {
            snapshot: ProgressEvent {
                message: "Failed".to_string(),
                ..snapshot
            },
            failure,
        }
    }
}

/// Worker-side running counters for one task.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    task_id: TaskId,
    processed: u64,
    total: Option<u64>,
    current_path: Option<PathBuf>,
}

impl ProgressTracker {
    pub(crate) fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            processed: 0,
            total: None,
            current_path: None,
        }
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed
    }

    pub(crate) fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub(crate) fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    pub(crate) fn set_current_path(&mut self, path: &Path) {
        self.current_path = Some(path.to_path_buf());
    }

    /// Raise the processed count; lower values are ignored.
    pub(crate) fn advance_to(&mut self, processed: u64) {
        self.processed = self.processed.max(processed);
    }

    pub(crate) fn record_items(&mut self, count: u64) {
        self.processed += count;
    }

    pub(crate) fn snapshot(&self, message: impl Into<String>) -> ProgressEvent {
        ProgressEvent {
            task_id: self.task_id,
            processed_count: self.processed,
            total_estimate: self.total,
            current_path: self.current_path.clone(),
            message: message.into(),
        }
    }
}
