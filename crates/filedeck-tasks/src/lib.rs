//! Background task subsystem for filedeck.
//!
//! One worker runs at most one task at a time on tokio's blocking pool. The
//! interactive thread talks to it through a [`TaskDispatcher`]:
//!
//! - [`TaskDispatcher::submit`] validates a [`Task`](filedeck_core::Task)
//!   and starts it, or refuses with [`SubmitError`].
//! - [`TaskDispatcher::poll`] drains the task's [`TaskEvent`]s without
//!   blocking; the stream ends with exactly one terminal event.
//! - [`TaskDispatcher::cancel`] requests a cooperative stop that the worker
//!   honours at its next checkpoint.
//!
//! The process-wide [`Clipboard`] and [`start_paste`] sit on top of the
//! dispatcher and implement copy/cut/paste across tabs.

mod cancel;
mod clipboard;
mod dispatcher;
mod outcome;
mod progress;
mod search;
mod worker;

pub use cancel::{CancelState, CancellationToken};
pub use clipboard::{
    start_paste, Clipboard, ClipboardMode, ClipboardSnapshot, PasteError, PendingPaste, TabId,
};
pub use dispatcher::{validate, SubmitError, TaskDispatcher, TaskHandle};
pub use outcome::{TaskFailure, TaskOutput, TransferSummary};
pub use progress::{ProgressEvent, TaskEvent};
pub use search::SearchResult;

/// Poll cadence used by the command-line front end.
pub const POLL_INTERVAL_MS: u64 = 50;
