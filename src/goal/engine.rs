// src/goal/engine.rs

//! Shared goal lifecycle.
//!
//! Every goal variant goes through the same state machine:
//!
//! ```text
//! Idle --start()--> Starting --deps resolved--> Running --compute--> Done | Failed
//!   \                  \                           \
//!    +------------------+---------------------------+--> Done (complete) | Cancelled
//! ```
//!
//! The outcome is fixed exactly once, under the goal's lock. Whoever fixes it
//! (the computation, `complete` or `cancel`) also takes the registered
//! on-complete hooks and runs them before publishing the outcome to waiters.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{EngineError, GoalError, Result};
use crate::goal::{
    Dependency, DependencyRef, GoalContext, GoalResult, GoalState, GoalValue, Outcome,
};

/// What distinguishes one goal variant from another.
///
/// Implementations declare their upstream goals and produce the computation
/// that runs once all of them resolved successfully. `compute` is invoked at
/// most once per goal.
pub trait GoalLogic<T>: Send + Sync + 'static {
    fn dependencies(&self) -> Vec<DependencyRef> {
        Vec::new()
    }

    fn compute(&self, ctx: GoalContext) -> BoxFuture<'static, Outcome<T>>;
}

type StartHook = Box<dyn FnOnce() + Send>;
type CompleteHook<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

struct Core<T> {
    state: GoalState,
    /// Set exactly once; `Some` means nobody else may resolve the goal.
    outcome: Option<Outcome<T>>,
    /// Whether on-start hooks already fired.
    began: bool,
    worker: Option<JoinHandle<()>>,
    start_hooks: Vec<StartHook>,
    complete_hooks: Vec<CompleteHook<T>>,
}

struct GoalInner<T> {
    label: Option<Arc<str>>,
    logic: Box<dyn GoalLogic<T>>,
    runtime: Option<Handle>,
    token: CancellationToken,
    core: Mutex<Core<T>>,
    result_tx: watch::Sender<Option<Outcome<T>>>,
}

/// A lazily started, at-most-once computed value with explicit dependencies.
///
/// `Goal` is a cheap handle; clones refer to the same goal.
pub struct Goal<T> {
    inner: Arc<GoalInner<T>>,
}

impl<T> Clone for Goal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: GoalValue> fmt::Debug for Goal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for goals that need a label or a dedicated runtime.
pub struct GoalBuilder<T> {
    logic: Box<dyn GoalLogic<T>>,
    label: Option<String>,
    runtime: Option<Handle>,
}

impl<T: GoalValue> GoalBuilder<T> {
    pub fn new(logic: impl GoalLogic<T>) -> Self {
        Self {
            logic: Box::new(logic),
            label: None,
            runtime: None,
        }
    }

    /// Name used in log fields and error messages.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Run the computation on this runtime instead of the caller's.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub(crate) fn runtime_opt(mut self, handle: Option<Handle>) -> Self {
        self.runtime = handle;
        self
    }

    pub fn build(self) -> Goal<T> {
        let (result_tx, _) = watch::channel(None);
        Goal {
            inner: Arc::new(GoalInner {
                label: self.label.map(Arc::from),
                logic: self.logic,
                runtime: self.runtime,
                token: CancellationToken::new(),
                core: Mutex::new(Core {
                    state: GoalState::Idle,
                    outcome: None,
                    began: false,
                    worker: None,
                    start_hooks: Vec::new(),
                    complete_hooks: Vec::new(),
                }),
                result_tx,
            }),
        }
    }
}

impl<T: GoalValue> Goal<T> {
    pub fn from_logic(logic: impl GoalLogic<T>) -> Self {
        GoalBuilder::new(logic).build()
    }

    pub fn builder(logic: impl GoalLogic<T>) -> GoalBuilder<T> {
        GoalBuilder::new(logic)
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn state(&self) -> GoalState {
        self.inner.lock_core().state
    }

    /// Whether the outcome is fixed.
    pub fn is_done(&self) -> bool {
        self.inner.lock_core().outcome.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state() == GoalState::Running
    }

    /// Upstream goals this goal waits for.
    pub fn dependencies(&self) -> Vec<DependencyRef> {
        self.inner.logic.dependencies()
    }

    /// Read side of the outcome. Does not start the goal.
    pub fn result(&self) -> GoalResult<T> {
        GoalResult::new(self.inner.result_tx.subscribe())
    }

    pub fn as_dependency(&self) -> DependencyRef {
        Arc::new(self.clone())
    }

    pub(crate) fn runtime_handle(&self) -> Option<Handle> {
        self.inner.runtime.clone()
    }

    /// Start the goal: dependencies first, then the own computation once all
    /// of them resolved. Calling this more than once has no further effect.
    pub fn start(&self) {
        {
            let mut core = self.inner.lock_core();
            if core.state != GoalState::Idle {
                return;
            }
            core.state = GoalState::Starting;
        }

        let deps = self.inner.logic.dependencies();
        for dep in &deps {
            dep.start();
        }

        let Some(runtime) = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            warn!(goal = %self.inner.describe(), "cannot start goal outside of a tokio runtime");
            self.inner.finish(Err(GoalError::NoRuntime));
            return;
        };

        let mut core = self.inner.lock_core();
        if core.outcome.is_some() {
            debug!(goal = %self.inner.describe(), "goal resolved while starting; not computing");
            return;
        }

        debug!(
            goal = %self.inner.describe(),
            dependencies = deps.len(),
            "starting goal"
        );
        let inner = Arc::clone(&self.inner);
        core.worker = Some(runtime.spawn(inner.drive(deps)));
    }

    /// Start the goal and wait for its outcome.
    pub async fn get(&self) -> Outcome<T> {
        self.start();
        self.result().wait().await
    }

    /// Force the outcome to `value`.
    ///
    /// Any in-flight computation (or dependency wait) is aborted, and this
    /// method only returns once the aborted computation has stopped, so it can
    /// no longer touch external state. Fails if the outcome is already fixed.
    /// Dropping the returned future early still publishes `value`.
    ///
    /// Must not be called from within this goal's own computation.
    pub async fn complete(&self, value: T) -> Result<()> {
        let (worker, hooks) = {
            let mut core = self.inner.lock_core();
            if core.outcome.is_some() {
                return Err(EngineError::AlreadyCompleted(self.inner.describe()));
            }
            core.state = GoalState::Done;
            core.outcome = Some(Ok(value.clone()));
            (core.worker.take(), std::mem::take(&mut core.complete_hooks))
        };

        self.inner.token.cancel();
        if let Some(worker) = worker.as_ref() {
            worker.abort();
        }

        debug!(goal = %self.inner.describe(), "goal completed externally");
        PendingPublish {
            inner: Arc::clone(&self.inner),
            worker,
            pending: Some((Ok(value), hooks)),
        }
        .run()
        .await;
        Ok(())
    }

    /// Resolve the goal as cancelled.
    ///
    /// With `may_interrupt` the running computation is aborted as well;
    /// otherwise it keeps running but its result is discarded. Returns `false`
    /// if the outcome was already fixed.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let (worker, hooks) = {
            let mut core = self.inner.lock_core();
            if core.outcome.is_some() {
                return false;
            }
            core.state = GoalState::Cancelled;
            core.outcome = Some(Err(GoalError::Cancelled));
            let worker = if may_interrupt {
                core.worker.take()
            } else {
                None
            };
            (worker, std::mem::take(&mut core.complete_hooks))
        };

        if may_interrupt {
            self.inner.token.cancel();
            if let Some(worker) = worker {
                worker.abort();
            }
        }

        debug!(goal = %self.inner.describe(), may_interrupt, "goal cancelled");
        self.inner.publish(Err(GoalError::Cancelled), hooks);
        true
    }

    /// Register a hook fired right before the own computation begins.
    ///
    /// Fires immediately if the computation already began; dropped if the
    /// goal resolved without ever computing.
    pub fn on_start(&self, hook: impl FnOnce() + Send + 'static) {
        let mut core = self.inner.lock_core();
        if core.began {
            drop(core);
            run_start_hook(&self.inner.describe(), Box::new(hook));
        } else if core.outcome.is_some() {
            trace!(goal = %self.inner.describe(), "goal resolved without computing; start hook dropped");
        } else {
            core.start_hooks.push(Box::new(hook));
        }
    }

    /// Register a hook receiving the outcome exactly once.
    ///
    /// Fires immediately if the outcome is already fixed.
    pub fn on_complete(&self, hook: impl FnOnce(&Outcome<T>) + Send + 'static) {
        let mut core = self.inner.lock_core();
        match core.outcome.clone() {
            Some(outcome) => {
                drop(core);
                run_complete_hook(&self.inner.describe(), Box::new(hook), &outcome);
            }
            None => core.complete_hooks.push(Box::new(hook)),
        }
    }
}

impl<T: GoalValue> GoalInner<T> {
    fn lock_core(&self) -> MutexGuard<'_, Core<T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self) -> String {
        self.label.as_deref().unwrap_or("goal").to_string()
    }

    /// Worker body: dependency barrier, start hooks, computation.
    async fn drive(self: Arc<Self>, deps: Vec<DependencyRef>) {
        let token = self.token.clone();

        let barrier = futures::future::try_join_all(deps.iter().map(|dep| dep.resolved()));
        let deps_outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = barrier => res,
        };
        if let Err(err) = deps_outcome {
            debug!(goal = %self.describe(), error = %err, "dependency did not succeed");
            self.finish(Err(err));
            return;
        }

        let hooks = {
            let mut core = self.lock_core();
            if core.outcome.is_some() {
                return;
            }
            core.state = GoalState::Running;
            core.began = true;
            std::mem::take(&mut core.start_hooks)
        };
        let label = self.describe();
        for hook in hooks {
            run_start_hook(&label, hook);
        }

        trace!(goal = %label, "computing goal");
        let ctx = GoalContext::new(token.clone(), self.label.clone());
        let built = std::panic::catch_unwind(AssertUnwindSafe(|| self.logic.compute(ctx)));
        let computation = match built {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(goal = %label, panic = %message, "goal computation panicked");
                self.finish(Err(GoalError::Panicked(message)));
                return;
            }
        };
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = computation => res.unwrap_or_else(|payload| {
                Err(GoalError::Panicked(panic_message(payload.as_ref())))
            }),
        };

        self.finish(outcome);
    }

    /// Fix the outcome from the computation side. Loses against any earlier
    /// `complete`/`cancel`.
    fn finish(&self, outcome: Outcome<T>) -> bool {
        let hooks = {
            let mut core = self.lock_core();
            if core.outcome.is_some() {
                return false;
            }
            core.state = GoalState::from_outcome(&outcome);
            core.outcome = Some(outcome.clone());
            core.worker = None;
            std::mem::take(&mut core.complete_hooks)
        };

        match &outcome {
            Ok(_) => debug!(goal = %self.describe(), "goal resolved"),
            Err(err) => debug!(goal = %self.describe(), error = %err, "goal failed"),
        }
        self.publish(outcome, hooks);
        true
    }

    /// Run on-complete hooks, then release result waiters.
    fn publish(&self, outcome: Outcome<T>, hooks: Vec<CompleteHook<T>>) {
        let label = self.describe();
        for hook in hooks {
            run_complete_hook(&label, hook, &outcome);
        }
        self.result_tx.send_replace(Some(outcome));
    }
}

/// Outcome claimed by `complete`, published once the aborted worker stopped.
///
/// If the `complete` future is dropped early, publishing moves to a task on
/// the goal's runtime (or happens right away without one), so waiters are
/// always released.
struct PendingPublish<T: GoalValue> {
    inner: Arc<GoalInner<T>>,
    worker: Option<JoinHandle<()>>,
    pending: Option<(Outcome<T>, Vec<CompleteHook<T>>)>,
}

impl<T: GoalValue> PendingPublish<T> {
    async fn run(mut self) {
        if let Some(worker) = self.worker.as_mut() {
            // Aborted or finished, either way it has stopped running.
            let _ = worker.await;
        }
        self.worker = None;
        if let Some((outcome, hooks)) = self.pending.take() {
            self.inner.publish(outcome, hooks);
        }
    }
}

impl<T: GoalValue> Drop for PendingPublish<T> {
    fn drop(&mut self) {
        let Some((outcome, hooks)) = self.pending.take() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let runtime = inner.runtime.clone().or_else(|| Handle::try_current().ok());

        match (self.worker.take(), runtime) {
            (Some(worker), Some(runtime)) => {
                trace!(goal = %inner.describe(), "complete dropped; publishing once the worker stops");
                runtime.spawn(async move {
                    let _ = worker.await;
                    inner.publish(outcome, hooks);
                });
            }
            _ => inner.publish(outcome, hooks),
        }
    }
}

impl<T: GoalValue> Dependency for Goal<T> {
    fn start(&self) {
        Goal::start(self)
    }

    fn resolved(&self) -> BoxFuture<'static, std::result::Result<(), GoalError>> {
        let result = self.result();
        async move { result.wait().await.map(|_| ()) }.boxed()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

fn run_start_hook(label: &str, hook: StartHook) {
    if std::panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
        warn!(goal = %label, "on-start hook panicked");
    }
}

fn run_complete_hook<T>(label: &str, hook: CompleteHook<T>, outcome: &Outcome<T>) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| hook(outcome))).is_err() {
        warn!(goal = %label, "on-complete hook panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
