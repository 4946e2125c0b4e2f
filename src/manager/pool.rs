// src/manager/pool.rs

//! Worker pools owned by the manager.
//!
//! - [`ParallelPool`] spawns each job as its own Tokio task; a semaphore
//!   bounds how many run at once.
//! - [`SerialPool`] is a single executor loop draining a queue, so its jobs
//!   never overlap. [`SerialLane`] is the cloneable submit side.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::work::{TaskHandle, TaskStatus};

pub(crate) type JobFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Run `job`, reflecting its lifecycle into `handle`.
///
/// The job is skipped if it was cancelled while queued, and dropped at its
/// next `.await` once the handle's token is cancelled.
pub(crate) async fn run_tracked(handle: TaskHandle, job: JobFuture) {
    if !handle.mark_running() {
        debug!("work cancelled before it started");
        return;
    }

    let token = handle.token();
    let status = tokio::select! {
        biased;
        _ = token.cancelled() => TaskStatus::Cancelled,
        res = AssertUnwindSafe(job).catch_unwind() => match res {
            Ok(Ok(())) => TaskStatus::Succeeded,
            Ok(Err(err)) => {
                let reason = format!("{err:#}");
                warn!(error = %reason, "work failed");
                TaskStatus::Failed(reason)
            }
            Err(_) => {
                warn!("work panicked");
                TaskStatus::Failed("work panicked".to_string())
            }
        },
    };

    handle.finish(status);
}

pub(crate) struct ParallelPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
}

impl ParallelPool {
    pub(crate) fn new(runtime: Handle, parallelism: usize) -> Self {
        info!(parallelism, "parallel pool started");
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(parallelism)),
        }
    }

    pub(crate) fn spawn(&self, handle: TaskHandle, span: Span, job: JobFuture) {
        let permits = Arc::clone(&self.permits);
        let tracked = handle.clone();

        let join = self.runtime.spawn(
            async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("parallel pool closed before work started");
                        tracked.finish(TaskStatus::Cancelled);
                        return;
                    }
                };
                run_tracked(tracked, job).await;
            }
            .instrument(span),
        );

        handle.set_abort(join.abort_handle());
    }

    /// Refuse new permits; queued jobs resolve as cancelled.
    pub(crate) fn close(&self) {
        self.permits.close();
    }
}

struct SerialJob {
    handle: TaskHandle,
    span: Span,
    job: JobFuture,
}

pub(crate) struct SerialPool {
    tx: mpsc::Sender<SerialJob>,
    worker: JoinHandle<()>,
}

impl SerialPool {
    /// Spawn the executor loop. Jobs run strictly one after another.
    pub(crate) fn spawn_loop(runtime: &Handle, queue_length: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SerialJob>(queue_length);

        let worker = runtime.spawn(async move {
            info!("serial pool started");

            while let Some(SerialJob { handle, span, job }) = rx.recv().await {
                run_tracked(handle, job).instrument(span).await;
            }

            info!("serial pool finished (queue closed)");
        });

        Self { tx, worker }
    }

    pub(crate) fn lane(&self) -> SerialLane {
        SerialLane {
            tx: self.tx.clone(),
        }
    }

    /// Stop the loop; the running job is dropped, queued jobs never run.
    pub(crate) fn close(&self) {
        self.worker.abort();
    }
}

/// Submit side of the serial pool.
///
/// Holding a lane does not keep the manager alive, so it is safe to capture
/// in goals that are themselves tracked by the manager.
#[derive(Clone)]
pub struct SerialLane {
    tx: mpsc::Sender<SerialJob>,
}

impl fmt::Debug for SerialLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLane")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SerialLane {
    pub(crate) fn try_enqueue(
        &self,
        name: &str,
        handle: TaskHandle,
        span: Span,
        job: JobFuture,
    ) -> Result<()> {
        self.tx
            .try_send(SerialJob { handle, span, job })
            .map_err(|err| match err {
                TrySendError::Full(_) => EngineError::QueueFull(name.to_string()),
                TrySendError::Closed(_) => EngineError::ShutDown,
            })
    }

    /// Run `fut` on the serial pool and wait for its output.
    ///
    /// If the caller stops waiting, the job is dropped at its next `.await`.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (mut tx, rx) = oneshot::channel();
        let job: JobFuture = async move {
            let output = tokio::select! {
                biased;
                _ = tx.closed() => None,
                output = fut => Some(output),
            };
            if let Some(output) = output {
                let _ = tx.send(output);
            }
            Ok(())
        }
        .boxed();

        self.tx
            .send(SerialJob {
                handle: TaskHandle::new(),
                span: Span::current(),
                job,
            })
            .await
            .map_err(|_| EngineError::ShutDown)?;

        rx.await.map_err(|_| EngineError::ShutDown)
    }
}
