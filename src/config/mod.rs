// src/config/mod.rs

//! Configuration for goalwork.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`): engine settings and
//!   the job plan run by the CLI.
//! - Load a plan file from disk (`loader.rs`).
//! - Validate limits, names, dependencies and acyclicity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{EngineConfig, EngineSection, JobConfig, PlanFile, RawPlanFile};
