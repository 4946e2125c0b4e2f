// src/goal/result.rs

//! Resolved-once outcome cell of a goal.

use tokio::sync::watch;

use crate::errors::GoalError;

/// Final outcome of a goal.
pub type Outcome<T> = Result<T, GoalError>;

/// Read side of a goal's outcome.
///
/// Obtaining or waiting on a `GoalResult` never starts the goal.
#[derive(Debug, Clone)]
pub struct GoalResult<T> {
    rx: watch::Receiver<Option<Outcome<T>>>,
}

impl<T: Clone> GoalResult<T> {
    pub(crate) fn new(rx: watch::Receiver<Option<Outcome<T>>>) -> Self {
        Self { rx }
    }

    /// Wait until the outcome is published.
    ///
    /// If the owning goal is dropped before resolving, this reports
    /// [`GoalError::Cancelled`].
    pub async fn wait(&self) -> Outcome<T> {
        let mut rx = self.rx.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        published.unwrap_or(Err(GoalError::Cancelled))
    }

    /// Outcome if already published.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.rx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
