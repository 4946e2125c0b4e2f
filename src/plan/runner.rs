// src/plan/runner.rs

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::PlanFile;
use crate::errors::{EngineError, GoalError, Result};
use crate::goal::Goal;
use crate::manager::WorkManager;
use crate::plan::graph::PlanGraph;
use crate::plan::job::{JobGoal, JobReport};
use crate::types::PoolKind;
use crate::work::WorkSnapshot;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Cancel the whole tree after this long.
    pub cancel_after: Option<Duration>,
}

/// How every job of a plan ended.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub succeeded: Vec<JobReport>,
    pub failed: Vec<(String, GoalError)>,
    pub cancelled: Vec<String>,
    /// Tree state once every job resolved.
    pub snapshot: WorkSnapshot,
}

impl PlanOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

/// Build one goal per job, track each under its tree name and wait for all
/// of them.
pub async fn run_plan(manager: &WorkManager, plan: &PlanFile, options: RunOptions) -> Result<PlanOutcome> {
    let graph = PlanGraph::from_plan(plan);
    let order = graph.topological_order()?;

    let lane = if plan.job.values().any(|job| job.pool == PoolKind::Serial) {
        Some(manager.serial_lane()?)
    } else {
        None
    };

    let mut goals: BTreeMap<String, Goal<JobReport>> = BTreeMap::new();
    for name in &order {
        let job = plan
            .job
            .get(name)
            .ok_or_else(|| EngineError::ConfigError(format!("unknown job '{name}'")))?;
        let tree_name = plan.tree_name(name);

        let node = manager.reserve(&tree_name)?;
        node.set_title(job.display_title(name));
        node.set_max_progress(f64::from(job.steps));

        let upstream = graph
            .dependencies_of(name)
            .iter()
            .filter_map(|dep| goals.get(dep).cloned())
            .collect();
        let job_lane = match job.pool {
            PoolKind::Serial => lane.clone(),
            PoolKind::Parallel => None,
        };
        let logic = JobGoal::new(name.clone(), job, upstream, manager.callback(&tree_name), job_lane);

        goals.insert(name.clone(), Goal::builder(logic).label(name.clone()).build());
    }

    for name in &order {
        if let Some(goal) = goals.get(name) {
            manager.submit_goal(&plan.tree_name(name), goal)?;
        }
    }
    info!(jobs = goals.len(), roots = ?graph.roots(), "plan started");

    let timer = options.cancel_after.map(|after| {
        let manager = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            warn!(?after, "cancelling plan");
            manager.root().cancel(true);
        })
    });

    let outcomes = join_all(
        goals
            .iter()
            .map(|(name, goal)| async move { (name.clone(), goal.get().await) }),
    )
    .await;

    if let Some(timer) = timer {
        timer.abort();
    }

    let mut outcome = PlanOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
        cancelled: Vec::new(),
        snapshot: manager.snapshot(),
    };
    for (name, result) in outcomes {
        match result {
            Ok(report) => outcome.succeeded.push(report),
            Err(GoalError::Cancelled) => outcome.cancelled.push(name),
            Err(err) => {
                warn!(job = %name, error = %err, "job did not succeed");
                outcome.failed.push((name, err));
            }
        }
    }

    info!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        cancelled = outcome.cancelled.len(),
        "plan finished"
    );
    Ok(outcome)
}
