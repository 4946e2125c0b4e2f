// src/goal/context.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::GoalError;

/// Handed to a goal computation so it can cooperate with aborts.
///
/// Aborting a goal (through `complete` or `cancel(true)`) cancels the token
/// and also drops the computation at its next `.await`. Long synchronous
/// sections should call [`GoalContext::check`] between steps.
#[derive(Debug, Clone)]
pub struct GoalContext {
    token: CancellationToken,
    label: Option<Arc<str>>,
}

impl GoalContext {
    pub(crate) fn new(token: CancellationToken, label: Option<Arc<str>>) -> Self {
        Self { token, label }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the goal has been aborted.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// `Err(GoalError::Cancelled)` once the goal has been aborted.
    pub fn check(&self) -> Result<(), GoalError> {
        if self.token.is_cancelled() {
            Err(GoalError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
