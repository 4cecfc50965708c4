//! Load task state machine.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::CacheKey;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a [`LoadTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not yet executing.
    Pending,
    /// Executing the lookup/decode pipeline.
    Running,
    /// Pipeline finished and the completion path ran (or was skipped by the
    /// surface identity check).
    Completed,
    /// Superseded before completion; the completion callback is suppressed.
    Cancelled,
}

/// Shared handle to a load task. Task identity is pointer identity.
pub type TaskHandle = Arc<LoadTask>;

/// One in-flight decode/load attempt bound to a display surface.
///
/// The task never owns its surface; the coordinator holds the surface as a
/// weak reference and re-checks the binding before installing a result.
#[derive(Debug)]
pub struct LoadTask {
    id: u64,
    key: CacheKey,
    max_width: u32,
    max_height: u32,
    cancelled: AtomicBool,
    state: Mutex<TaskState>,
}

impl LoadTask {
    /// Creates a new task in [`TaskState::Pending`].
    #[must_use]
    pub fn new(key: CacheKey, max_width: u32, max_height: u32) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            key,
            max_width,
            max_height,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(TaskState::Pending),
        }
    }

    /// Process-unique task id, for logging.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The key this task is loading.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Requested maximum display width.
    #[must_use]
    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    /// Requested maximum display height.
    #[must_use]
    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.lock().expect("task state lock poisoned")
    }

    /// True once the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), TaskState::Completed | TaskState::Cancelled)
    }

    /// Requests cooperative cancellation.
    ///
    /// In-flight lookups are allowed to complete; cancellation only
    /// suppresses the final surface mutation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let mut state = self.state.lock().expect("task state lock poisoned");
        if !matches!(*state, TaskState::Completed) {
            *state = TaskState::Cancelled;
        }
    }

    /// True if cancellation was requested. Checked at pipeline checkpoints.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Transitions `Pending -> Running`. A cancelled task stays cancelled.
    pub fn mark_running(&self) {
        let mut state = self.state.lock().expect("task state lock poisoned");
        if matches!(*state, TaskState::Pending) {
            *state = TaskState::Running;
        }
    }

    /// Attempts the `Running -> Completed` transition.
    ///
    /// Returns `false` if the task was cancelled in the meantime, in which
    /// case the caller must discard the result silently.
    pub fn try_complete(&self) -> bool {
        let mut state = self.state.lock().expect("task state lock poisoned");
        if self.cancelled.load(Ordering::Acquire) || matches!(*state, TaskState::Cancelled) {
            return false;
        }
        *state = TaskState::Completed;
        true
    }
}
