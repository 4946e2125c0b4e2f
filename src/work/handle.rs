// src/work/handle.rs

//! Asynchronous handles a work node can own.
//!
//! The tree does not care what the handle runs; it only asks whether it is
//! done, cancels it, and wants to be told when it finishes. Goals implement
//! [`WorkHandle`] directly; work spawned on a manager pool is tracked through
//! [`TaskHandle`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::goal::{Goal, GoalValue};

/// Callback fired once when a handle finishes.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// Minimal interface between a work node and the computation it tracks.
pub trait WorkHandle: Send + Sync + 'static {
    /// Finished, whatever the outcome.
    fn is_done(&self) -> bool;

    /// Request cancellation. `interrupt` also aborts running work.
    fn cancel(&self, interrupt: bool);

    /// Register `callback` to run once the handle is done (immediately if it
    /// already is).
    fn on_done(&self, callback: DoneCallback);

    /// Finished with an error. Cancellation is not a failure.
    fn is_failed(&self) -> bool {
        false
    }
}

impl<T: GoalValue> WorkHandle for Goal<T> {
    fn is_done(&self) -> bool {
        Goal::is_done(self)
    }

    fn cancel(&self, interrupt: bool) {
        Goal::cancel(self, interrupt);
    }

    fn on_done(&self, callback: DoneCallback) {
        self.on_complete(move |_| callback());
    }

    fn is_failed(&self) -> bool {
        matches!(self.result().try_get(), Some(Err(err)) if !err.is_cancelled())
    }
}

/// Status of work spawned on a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for a pool slot.
    Queued,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed(_) | TaskStatus::Cancelled
        )
    }
}

struct TaskInner {
    token: CancellationToken,
    status: watch::Sender<TaskStatus>,
    abort: Mutex<Option<AbortHandle>>,
    listeners: Mutex<Vec<DoneCallback>>,
}

/// Handle for work running on a [`crate::manager::WorkManager`] pool.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHandle {
    pub fn new() -> Self {
        let (status, _) = watch::channel(TaskStatus::Queued);
        Self {
            inner: Arc::new(TaskInner {
                token: CancellationToken::new(),
                status,
                abort: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status.borrow().clone()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status(), TaskStatus::Failed(_))
    }

    /// Wait for a terminal status.
    pub async fn wait(&self) -> TaskStatus {
        let mut rx = self.inner.status.subscribe();
        let status = match rx.wait_for(TaskStatus::is_terminal).await {
            Ok(status) => (*status).clone(),
            Err(_) => TaskStatus::Cancelled,
        };
        status
    }

    pub(crate) fn set_abort(&self, abort: AbortHandle) {
        *lock(&self.inner.abort) = Some(abort);
        // Cancelled before the pool handed us the abort handle.
        if self.inner.token.is_cancelled() {
            abort_now(&self.inner.abort);
        }
    }

    /// Queued → Running. `false` if the task was cancelled while queued.
    pub(crate) fn mark_running(&self) -> bool {
        self.inner.status.send_if_modified(|status| {
            if *status == TaskStatus::Queued {
                *status = TaskStatus::Running;
                true
            } else {
                false
            }
        })
    }

    /// Move to a terminal status. Only the first call has an effect.
    pub(crate) fn finish(&self, outcome: TaskStatus) -> bool {
        let changed = self.inner.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = outcome;
                true
            }
        });
        if changed {
            trace!(status = ?self.status(), "task finished");
            let listeners = std::mem::take(&mut *lock(&self.inner.listeners));
            for callback in listeners {
                callback();
            }
        }
        changed
    }
}

impl WorkHandle for TaskHandle {
    fn is_done(&self) -> bool {
        self.inner.status.borrow().is_terminal()
    }

    fn cancel(&self, interrupt: bool) {
        if interrupt {
            self.inner.token.cancel();
            abort_now(&self.inner.abort);
        }
        self.finish(TaskStatus::Cancelled);
    }

    fn is_failed(&self) -> bool {
        TaskHandle::is_failed(self)
    }

    fn on_done(&self, callback: DoneCallback) {
        let mut listeners = lock(&self.inner.listeners);
        if self.inner.status.borrow().is_terminal() {
            drop(listeners);
            callback();
        } else {
            listeners.push(callback);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn abort_now(slot: &Mutex<Option<AbortHandle>>) {
    if let Some(abort) = lock(slot).take() {
        abort.abort();
    }
}
