// src/plan/job.rs

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use crate::config::JobConfig;
use crate::errors::GoalError;
use crate::goal::{DependencyRef, Goal, GoalContext, GoalLogic, Outcome};
use crate::manager::SerialLane;
use crate::work::WorkCallback;

/// What a finished job hands to its dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub name: String,
    pub steps: u32,
}

/// One plan job as a goal: waits for its `after` jobs, then walks through
/// its steps, reporting one unit of progress per step.
///
/// Serial jobs run their steps on the manager's serial pool.
pub struct JobGoal {
    name: String,
    steps: u32,
    step: Duration,
    fail_at_step: Option<u32>,
    upstream: Vec<Goal<JobReport>>,
    callback: WorkCallback,
    lane: Option<SerialLane>,
}

impl JobGoal {
    pub fn new(
        name: impl Into<String>,
        job: &JobConfig,
        upstream: Vec<Goal<JobReport>>,
        callback: WorkCallback,
        lane: Option<SerialLane>,
    ) -> Self {
        Self {
            name: name.into(),
            steps: job.steps,
            step: job.step_duration(),
            fail_at_step: job.fail_at_step,
            upstream,
            callback,
            lane,
        }
    }
}

impl GoalLogic<JobReport> for JobGoal {
    fn dependencies(&self) -> Vec<DependencyRef> {
        self.upstream.iter().map(Goal::as_dependency).collect()
    }

    fn compute(&self, ctx: GoalContext) -> BoxFuture<'static, Outcome<JobReport>> {
        let body = run_steps(
            self.name.clone(),
            self.steps,
            self.step,
            self.fail_at_step,
            self.callback.clone(),
            ctx,
        );
        let lane = self.lane.clone();
        let name = self.name.clone();

        async move {
            let steps = match lane {
                Some(lane) => lane.run(body).await.map_err(GoalError::failed)??,
                None => body.await?,
            };
            info!(job = %name, steps, "job finished");
            Ok(JobReport { name, steps })
        }
        .boxed()
    }
}

async fn run_steps(
    name: String,
    steps: u32,
    step: Duration,
    fail_at_step: Option<u32>,
    callback: WorkCallback,
    ctx: GoalContext,
) -> Outcome<u32> {
    debug!(job = %name, steps, "job running");
    callback.set_message("running");

    for current in 1..=steps {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(GoalError::Cancelled),
            _ = tokio::time::sleep(step) => {}
        }

        if fail_at_step == Some(current) {
            callback.set_message(format!("failed at step {current}"));
            return Err(GoalError::failed(anyhow::anyhow!(
                "job '{name}' failed at step {current} of {steps}"
            )));
        }

        callback.increase_progress(1.0);
        callback.set_message(format!("step {current}/{steps}"));
    }

    callback.set_message("done");
    Ok(steps)
}
