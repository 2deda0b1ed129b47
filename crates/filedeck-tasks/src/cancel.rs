//! Cooperative cancellation for background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable state of a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    /// Nobody asked the task to stop.
    Clear,
    /// The interactive side asked the task to stop.
    Requested,
    /// The worker saw the request and stopped issuing mutations.
    Acknowledged,
}

#[derive(Debug, Default)]
struct TokenInner {
    signal: tokio_util::sync::CancellationToken,
    acknowledged: AtomicBool,
}

/// Tri-state cancellation flag shared by the interactive thread and the
/// worker.
///
/// The interactive side may only move Clear → Requested, the worker may
/// only move Requested → Acknowledged. Tokens created with
/// [`CancellationToken::child_of`] are also requested when their parent
/// signal fires, which is how dispatcher shutdown reaches the active task.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a fresh, clear token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is also requested when `parent` is cancelled.
    pub(crate) fn child_of(parent: &tokio_util::sync::CancellationToken) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                signal: parent.child_token(),
                acknowledged: AtomicBool::new(false),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CancelState {
        if self.inner.acknowledged.load(Ordering::Acquire) {
            CancelState::Acknowledged
        } else if self.inner.signal.is_cancelled() {
            CancelState::Requested
        } else {
            CancelState::Clear
        }
    }

    /// Ask the task to stop. Returns `true` if this call made the
    /// Clear → Requested transition.
    pub fn request(&self) -> bool {
        if self.inner.signal.is_cancelled() {
            return false;
        }
        self.inner.signal.cancel();
        true
    }

    /// Whether a stop was requested (acknowledged or not).
    pub fn is_requested(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    /// Worker side: Requested → Acknowledged. Returns `false` when the token
    /// was not requested or was already acknowledged.
    pub(crate) fn acknowledge(&self) -> bool {
        self.inner.signal.is_cancelled()
            && self
                .inner
                .acknowledged
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}
