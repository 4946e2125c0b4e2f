// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod goal;
pub mod logging;
pub mod manager;
pub mod plan;
pub mod types;
pub mod work;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{PlanFile, load_and_validate};
use crate::manager::WorkManager;
use crate::plan::{PlanGraph, RunOptions, run_plan};

pub use crate::errors::{EngineError, GoalError};
pub use crate::goal::{Goal, GoalBuilder, GoalContext, GoalLogic, GoalState};
pub use crate::manager::{SerialLane, WorkContext};
pub use crate::types::PoolKind;
pub use crate::work::{Work, WorkCallback, WorkEvent, WorkHandle, WorkSnapshot};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - the work manager and its pools
/// - one goal per job, tracked in the progress tree
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let plan = load_and_validate(&plan_path)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let manager = WorkManager::new(plan.engine);

    // Ctrl-C → cancel everything; pending jobs resolve as cancelled.
    let ctrl_c = {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received, cancelling all work");
            manager.root().cancel(true);
        })
    };

    let options = RunOptions {
        cancel_after: args.cancel_after_ms.map(Duration::from_millis),
    };
    let outcome = run_plan(&manager, &plan, options).await;

    ctrl_c.abort();
    manager.shutdown();
    let outcome = outcome?;

    println!("{}", outcome.snapshot);

    for (job, err) in &outcome.failed {
        eprintln!("job '{job}' failed: {err}");
    }
    if !outcome.failed.is_empty() {
        bail!("{} job(s) failed", outcome.failed.len());
    }
    if !outcome.cancelled.is_empty() {
        bail!("{} job(s) were cancelled", outcome.cancelled.len());
    }
    Ok(())
}

/// Simple dry-run output: engine settings, jobs and their order.
fn print_dry_run(plan: &PlanFile) {
    println!("goalwork dry-run");
    println!("  engine.parallelism = {}", plan.engine.parallelism);
    println!(
        "  engine.serial_queue_length = {}",
        plan.engine.serial_queue_length
    );
    println!("  engine.separator = {:?}", plan.engine.separator);
    println!();

    let graph = PlanGraph::from_plan(plan);
    println!("jobs ({}):", plan.job.len());
    for (name, job) in plan.job.iter() {
        println!("  - {} ({})", plan.tree_name(name), job.display_title(name));
        println!("      pool: {:?}, steps: {}", job.pool, job.steps);
        if let Some(ref step) = job.step {
            println!("      step: {step}");
        }
        if !job.after.is_empty() {
            println!("      after: {:?}", job.after);
        }
        let dependents = graph.dependents_of(name);
        if !dependents.is_empty() {
            println!("      needed by: {dependents:?}");
        }
        if let Some(at) = job.fail_at_step {
            println!("      fail_at_step: {at}");
        }
    }

    debug!("dry-run complete (no execution)");
}
