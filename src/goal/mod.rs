// src/goal/mod.rs

//! Asynchronous dependency-graph computation engine.
//!
//! A [`Goal`] is a lazily started value that is computed at most once, after
//! all of its dependencies have resolved successfully.
//!
//! - [`engine`] holds the shared lifecycle: dependency startup, hooks,
//!   cancellation and the external `complete` override.
//! - [`variants`] contains the concrete shapes (static, pipe, group,
//!   generator) built on top of [`GoalLogic`].
//! - [`result`] is the resolved-once outcome cell observers wait on.
//! - [`context`] is what a running computation receives to check for
//!   cancellation.

pub mod context;
pub mod engine;
pub mod result;
pub mod variants;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::GoalError;

pub use context::GoalContext;
pub use engine::{Goal, GoalBuilder, GoalLogic};
pub use result::{GoalResult, Outcome};
pub use variants::{GeneratorGoal, GroupGoal, PipeGoal, StaticGoal};

/// Bound for values produced by goals.
pub trait GoalValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> GoalValue for T {}

/// Lifecycle state of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    /// Created, `start()` not called yet.
    Idle,
    /// Dependencies started; waiting for them to resolve.
    Starting,
    /// Own computation is executing.
    Running,
    /// Resolved with a value (computed or overridden).
    Done,
    /// Resolved with a computation error (or a failed dependency).
    Failed,
    /// Resolved by cancellation.
    Cancelled,
}

impl GoalState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalState::Done | GoalState::Failed | GoalState::Cancelled
        )
    }

    pub(crate) fn from_outcome<T>(outcome: &Outcome<T>) -> Self {
        match outcome {
            Ok(_) => GoalState::Done,
            Err(GoalError::Cancelled) => GoalState::Cancelled,
            Err(_) => GoalState::Failed,
        }
    }
}

/// Type-erased view of a goal used as a dependency of another goal.
///
/// Dependents only need to start their upstreams and wait for them to
/// resolve; the value itself is read through the typed [`Goal`] handle.
pub trait Dependency: Send + Sync {
    /// Start the upstream goal (idempotent).
    fn start(&self);

    /// Future resolving once the upstream outcome is fixed.
    fn resolved(&self) -> BoxFuture<'static, Result<(), GoalError>>;

    /// Human readable name used in log fields.
    fn describe(&self) -> String;
}

/// Shared pointer to a type-erased dependency.
pub type DependencyRef = Arc<dyn Dependency>;
