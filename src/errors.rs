// src/errors.rs

//! Crate-wide error types.
//!
//! - [`EngineError`] covers usage errors (surfaced immediately to the caller)
//!   and configuration problems.
//! - [`GoalError`] is the outcome error of a goal computation. It is stored
//!   inside the goal and handed to every observer, so it is cheap to clone.

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in plan: {0}")]
    PlanCycle(String),

    #[error("Goal already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Work '{0}' is still running and cannot be replaced")]
    NameConflict(String),

    #[error("Invalid work name: {0:?}")]
    InvalidName(String),

    #[error("Work manager has been shut down")]
    ShutDown,

    #[error("Serial queue is full; cannot submit '{0}'")]
    QueueFull(String),

    #[error("No tokio runtime available")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a goal did not produce a value.
#[derive(Error, Debug, Clone)]
pub enum GoalError {
    /// The computation returned an error.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),

    /// The computation panicked.
    #[error("goal computation panicked: {0}")]
    Panicked(String),

    /// The goal (or the work owning it) was cancelled.
    #[error("goal was cancelled")]
    Cancelled,

    /// `start()` was called with no Tokio runtime available.
    #[error("no tokio runtime available to run goal")]
    NoRuntime,
}

impl GoalError {
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        GoalError::Failed(Arc::new(err.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GoalError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
