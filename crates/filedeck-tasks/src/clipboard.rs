//! Process-wide clipboard shared by every tab, and the paste flow built on
//! top of it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use filedeck_core::Task;
use filedeck_ops::paths::normalize;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::{SubmitError, TaskDispatcher, TaskHandle};
use crate::progress::TaskEvent;

/// Identifies the tab a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TabId(pub u32);

/// What a paste does with the clipboard items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardMode {
    /// Paste copies the items.
    Copy,
    /// Paste moves the items, then the clipboard is cleared.
    Cut,
}

/// Immutable view of the clipboard at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardSnapshot {
    /// Selected paths, normalized and deduplicated, in selection order.
    pub items: IndexSet<PathBuf>,
    pub mode: ClipboardMode,
    pub source_tab: TabId,
    /// Value of the clipboard's generation counter when this was set.
    pub generation: u64,
}

impl ClipboardSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Arc<ClipboardSnapshot>>,
    generation: u64,
}

/// Last-writer-wins clipboard.
///
/// The lock is held only to swap an `Arc`, so readers on any tab get a
/// consistent snapshot in constant time.
#[derive(Debug, Default)]
pub struct Clipboard {
    slot: Mutex<Slot>,
}

impl Clipboard {
    /// Create an empty clipboard, independent of [`Clipboard::global`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide clipboard, empty at startup.
    pub fn global() -> &'static Clipboard {
        static GLOBAL: OnceLock<Clipboard> = OnceLock::new();
        GLOBAL.get_or_init(Clipboard::new)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the clipboard contents and return the new generation.
    ///
    /// An empty selection clears the clipboard.
    pub fn set(
        &self,
        items: impl IntoIterator<Item = PathBuf>,
        mode: ClipboardMode,
        source_tab: TabId,
    ) -> u64 {
        let items: IndexSet<PathBuf> = items.into_iter().map(|p| normalize(&p)).collect();

        let mut slot = self.lock();
        slot.generation += 1;
        slot.current = if items.is_empty() {
            None
        } else {
            Some(Arc::new(ClipboardSnapshot {
                items,
                mode,
                source_tab,
                generation: slot.generation,
            }))
        };
        slot.generation
    }

    /// Snapshot of the current contents.
    pub fn get(&self) -> Option<Arc<ClipboardSnapshot>> {
        self.lock().current.clone()
    }

    pub fn clear(&self) {
        self.lock().current = None;
    }

    /// Clear only if nothing was set since `generation`. Returns whether the
    /// clipboard was cleared.
    pub fn clear_if_generation(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        match &slot.current {
            Some(current) if current.generation == generation => {
                slot.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().current.is_none()
    }

    /// Number of `set` calls so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}

/// Why a paste could not start.
#[derive(Debug, Error)]
pub enum PasteError {
    #[error("clipboard is empty")]
    Empty,

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Submit a copy or move of the clipboard items into `destination`.
///
/// The clipboard itself is left untouched here; feed the task's events to
/// [`PendingPaste::settle`] so a cut is cleared once it completes.
pub fn start_paste(
    dispatcher: &TaskDispatcher,
    clipboard: &Clipboard,
    destination: &Path,
) -> Result<(TaskHandle, PendingPaste), PasteError> {
    let snapshot = clipboard.get().ok_or(PasteError::Empty)?;
    let inputs = snapshot.items.iter().cloned();

    let task = match snapshot.mode {
        ClipboardMode::Copy => Task::bulk_copy(inputs, destination),
        ClipboardMode::Cut => Task::bulk_move(inputs, destination),
    };
    let handle = dispatcher.submit(task)?;

    tracing::debug!(
        task = %handle.id(),
        items = snapshot.len(),
        mode = ?snapshot.mode,
        "paste started"
    );
    Ok((handle, PendingPaste { snapshot }))
}

/// A paste in flight, remembering which clipboard contents it came from.
#[derive(Debug, Clone)]
pub struct PendingPaste {
    snapshot: Arc<ClipboardSnapshot>,
}

impl PendingPaste {
    /// The clipboard contents the paste was started from.
    pub fn snapshot(&self) -> &ClipboardSnapshot {
        &self.snapshot
    }

    /// React to one task event. A cut that completes (even with recorded
    /// per-item errors) clears the clipboard, unless something newer was
    /// set meanwhile; failed or cancelled pastes keep it for a retry.
    /// Returns whether the clipboard was cleared.
    pub fn settle(&self, clipboard: &Clipboard, event: &TaskEvent) -> bool {
        match (self.snapshot.mode, event) {
            (ClipboardMode::Cut, TaskEvent::Completed { .. }) => {
                clipboard.clear_if_generation(self.snapshot.generation)
            }
            _ => false,
        }
    }

    /// Run [`settle`](Self::settle) over a batch of polled events.
    pub fn settle_all(&self, clipboard: &Clipboard, events: &[TaskEvent]) -> bool {
        events.iter().fold(false, |cleared, event| {
            self.settle(clipboard, event) || cleared
        })
    }
}
