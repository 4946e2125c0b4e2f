// src/plan/mod.rs

//! Running a job plan on a [`WorkManager`](crate::manager::WorkManager).
//!
//! Each `[job.<name>]` becomes a goal whose dependencies are its `after`
//! jobs, tracked in the progress tree under `<group><sep><name>`.

pub mod graph;
pub mod job;
pub mod runner;

pub use graph::PlanGraph;
pub use job::{JobGoal, JobReport};
pub use runner::{PlanOutcome, RunOptions, run_plan};
