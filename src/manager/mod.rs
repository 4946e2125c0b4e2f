// src/manager/mod.rs

//! Work supervisor.
//!
//! [`WorkManager`] owns the root of the progress tree, a parallel pool and a
//! serial pool. Work is submitted under a hierarchical name; the manager
//! attaches a handle to that node, runs the work on the chosen pool and
//! hands it a [`WorkContext`] for progress reporting and cancellation.

pub mod context;
pub mod pool;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::goal::{Goal, GoalValue};
use crate::types::PoolKind;
use crate::work::{TaskHandle, TaskStatus, Work, WorkCallback, WorkEvent, WorkHandle, WorkSnapshot};

pub use context::WorkContext;
pub use pool::SerialLane;

use pool::{JobFuture, ParallelPool, SerialPool};

struct ManagerInner {
    config: EngineConfig,
    runtime: Option<Handle>,
    root: Work,
    events: broadcast::Sender<WorkEvent>,
    parallel: Mutex<Option<Arc<ParallelPool>>>,
    serial: Mutex<Option<Arc<SerialPool>>>,
    shut_down: AtomicBool,
}

/// Supervisor of named, hierarchical work.
///
/// Cheap to clone; the last clone dropped tears everything down the same
/// way [`WorkManager::shutdown`] does. Goals tracked by a manager must not
/// capture a clone of it (use [`SerialLane`] or [`WorkCallback`] instead),
/// otherwise the tree keeps the manager alive.
#[derive(Clone)]
pub struct WorkManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for WorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkManager")
            .field("config", &self.inner.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Default for WorkManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl WorkManager {
    /// Pools are created on first use on the ambient Tokio runtime.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Pools run on `runtime` regardless of the caller's context.
    pub fn with_runtime(config: EngineConfig, runtime: Handle) -> Self {
        Self::build(config, Some(runtime))
    }

    fn build(config: EngineConfig, runtime: Option<Handle>) -> Self {
        let root = Work::root(config.separator);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let forward = events.clone();
        root.subscribe(move |event| {
            // No receivers is fine.
            let _ = forward.send(event.clone());
        });

        debug!(?config, "work manager created");

        Self {
            inner: Arc::new(ManagerInner {
                config,
                runtime,
                root,
                events,
                parallel: Mutex::new(None),
                serial: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn root(&self) -> Work {
        self.inner.root.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn find(&self, name: &str) -> Option<Work> {
        self.inner.root.find(name)
    }

    /// Create (or return) the node for `name` without attaching any work.
    ///
    /// Useful to set a title or maximum on a group before its children are
    /// submitted.
    pub fn reserve(&self, name: &str) -> Result<Work> {
        self.ensure_running()?;
        self.inner.root.add_child(name, None)
    }

    /// Track an externally driven handle under `name`.
    pub fn submit_handle(&self, name: &str, handle: Arc<dyn WorkHandle>) -> Result<Work> {
        self.ensure_running()?;
        let work = self.inner.root.add_child(name, Some(Arc::clone(&handle)))?;
        self.reject_if_shut_down(&work, handle.as_ref())?;
        Ok(work)
    }

    /// Track `goal` under `name` and start it.
    pub fn submit_goal<T: GoalValue>(&self, name: &str, goal: &Goal<T>) -> Result<Work> {
        let work = self.submit_handle(name, Arc::new(goal.clone()))?;
        info!(work = %work.full_name(), "submitted goal");
        goal.start();
        Ok(work)
    }

    /// Run async work on the parallel pool.
    pub fn submit<F, Fut>(&self, name: &str, work: F) -> Result<Work>
    where
        F: FnOnce(WorkContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.submit_on(name, PoolKind::Parallel, work)
    }

    /// Run async work on the given pool.
    pub fn submit_on<F, Fut>(&self, name: &str, pool: PoolKind, work: F) -> Result<Work>
    where
        F: FnOnce(WorkContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.dispatch(name, pool, move |ctx| async move { work(ctx).await }.boxed())
    }

    /// Run a blocking closure on the given pool.
    ///
    /// The closure runs on Tokio's blocking threads; it is not interrupted
    /// and should poll [`WorkContext::check`] to honour cancellation.
    pub fn submit_blocking<F>(&self, name: &str, pool: PoolKind, work: F) -> Result<Work>
    where
        F: FnOnce(WorkContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatch(name, pool, move |ctx| {
            async move {
                match tokio::task::spawn_blocking(move || work(ctx)).await {
                    Ok(res) => res,
                    Err(err) => Err(anyhow::anyhow!("blocking work did not finish: {err}")),
                }
            }
            .boxed()
        })
    }

    fn dispatch(
        &self,
        name: &str,
        pool: PoolKind,
        make_job: impl FnOnce(WorkContext) -> JobFuture,
    ) -> Result<Work> {
        self.ensure_running()?;

        let handle = TaskHandle::new();
        let work = self
            .inner
            .root
            .add_child(name, Some(Arc::new(handle.clone())))?;

        let ctx = WorkContext::new(
            handle.token(),
            WorkCallback::new(&self.inner.root, work.full_name()),
        );
        let span = info_span!("work", name = %work.full_name(), ?pool);
        let job = make_job(ctx);

        let dispatched = match pool {
            PoolKind::Parallel => self.parallel_pool().map(|p| p.spawn(handle.clone(), span, job)),
            PoolKind::Serial => self
                .serial_pool()
                .and_then(|p| p.lane().try_enqueue(work.full_name(), handle.clone(), span, job)),
        };

        if let Err(err) = dispatched {
            warn!(work = %work.full_name(), error = %err, "could not dispatch work");
            handle.finish(TaskStatus::Cancelled);
            return Err(err);
        }
        self.reject_if_shut_down(&work, &handle)?;

        info!(work = %work.full_name(), ?pool, "submitted work");
        Ok(work)
    }

    /// A progress reporter addressing `name` below the root.
    pub fn callback(&self, name: &str) -> WorkCallback {
        WorkCallback::new(&self.inner.root, name)
    }

    /// Cancel the node `name` and everything below it.
    ///
    /// Returns `false` (and logs) if no such node exists.
    pub fn cancel(&self, name: &str, interrupt: bool) -> bool {
        match self.find(name) {
            Some(work) => {
                info!(work = %work.full_name(), interrupt, "cancelling");
                work.cancel(interrupt);
                true
            }
            None => {
                warn!(work = %name, "cancel requested for unknown work");
                false
            }
        }
    }

    /// Drop finished subtrees.
    pub fn cleanup(&self) {
        self.inner.root.cleanup();
    }

    pub fn snapshot(&self) -> WorkSnapshot {
        self.inner.root.snapshot()
    }

    /// Every tree event, in emission order.
    ///
    /// Slow receivers lag (see [`broadcast::error::RecvError::Lagged`]).
    pub fn subscribe(&self) -> broadcast::Receiver<WorkEvent> {
        self.inner.events.subscribe()
    }

    /// Submit side of the serial pool, for work that must not overlap with
    /// other serial work but is driven from elsewhere (e.g. a goal).
    pub fn serial_lane(&self) -> Result<SerialLane> {
        self.ensure_running()?;
        Ok(self.serial_pool()?.lane())
    }

    /// Run `fut` on the serial pool and wait for its output.
    pub async fn run_serial<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.serial_lane()?.run(fut).await
    }

    /// Cancel all work with interruption and stop both pools.
    ///
    /// Idempotent. Later submissions fail with [`EngineError::ShutDown`].
    pub fn shutdown(&self) {
        self.inner.teardown();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    /// A shutdown that started after `ensure_running` may have cancelled the
    /// tree before `handle` was attached; cancel it here instead.
    fn reject_if_shut_down(&self, work: &Work, handle: &dyn WorkHandle) -> Result<()> {
        if !self.is_shut_down() {
            return Ok(());
        }
        debug!(work = %work.full_name(), "manager shut down while submitting");
        handle.cancel(true);
        Err(EngineError::ShutDown)
    }

    fn runtime(&self) -> Result<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(EngineError::NoRuntime)
    }

    fn parallel_pool(&self) -> Result<Arc<ParallelPool>> {
        let mut slot = lock(&self.inner.parallel);
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        // Teardown sets the flag before emptying the slot.
        self.ensure_running()?;
        let pool = Arc::new(ParallelPool::new(self.runtime()?, self.inner.config.parallelism));
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    fn serial_pool(&self) -> Result<Arc<SerialPool>> {
        let mut slot = lock(&self.inner.serial);
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        // Teardown sets the flag before emptying the slot.
        self.ensure_running()?;
        let pool = Arc::new(SerialPool::spawn_loop(
            &self.runtime()?,
            self.inner.config.serial_queue_length,
        ));
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }
}

impl ManagerInner {
    fn teardown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down work manager");

        self.root.cancel(true);

        if let Some(pool) = lock(&self.parallel).take() {
            pool.close();
        }
        if let Some(pool) = lock(&self.serial).take() {
            pool.close();
        }

        self.root.clear_listeners();
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
