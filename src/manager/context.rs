// src/manager/context.rs

use tokio_util::sync::CancellationToken;

use crate::work::WorkCallback;

/// What a submitted unit of work receives.
///
/// Carries the cancellation token of its node's handle and a
/// [`WorkCallback`] bound to the node's full name.
#[derive(Debug, Clone)]
pub struct WorkContext {
    token: CancellationToken,
    callback: WorkCallback,
}

impl WorkContext {
    pub(crate) fn new(token: CancellationToken, callback: WorkCallback) -> Self {
        Self { token, callback }
    }

    /// Full name of the node this work reports into.
    pub fn name(&self) -> &str {
        self.callback.name()
    }

    pub fn callback(&self) -> &WorkCallback {
        &self.callback
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Error out of blocking loops once cancellation was requested.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.token.is_cancelled() {
            anyhow::bail!("work '{}' was cancelled", self.name());
        }
        Ok(())
    }
}
