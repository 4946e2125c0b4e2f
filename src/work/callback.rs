// src/work/callback.rs

use std::sync::Weak;

use tracing::debug;

use crate::work::node::{Work, WorkNode};

/// Narrow, late-bound progress reporter for one named node.
///
/// Holds only a weak pointer to the tree root and the node's full name; the
/// node is looked up on every call, so it may be created after the callback.
/// Updates for a missing node (or a dropped tree) are logged and ignored.
#[derive(Clone)]
pub struct WorkCallback {
    root: Weak<WorkNode>,
    name: String,
}

impl std::fmt::Debug for WorkCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkCallback")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl WorkCallback {
    pub fn new(root: &Work, name: impl Into<String>) -> Self {
        Self {
            root: root.downgrade(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the node right now.
    pub fn work(&self) -> Option<Work> {
        let root = Work::from_node(self.root.upgrade()?);
        root.find(&self.name)
    }

    pub fn set_progress(&self, progress: f64) {
        self.with_work(|work| work.set_progress(progress));
    }

    pub fn increase_progress(&self, delta: f64) {
        self.with_work(|work| work.increase_progress(delta));
    }

    pub fn set_max_progress(&self, max_progress: f64) {
        self.with_work(|work| work.set_max_progress(max_progress));
    }

    pub fn set_progress_to_max(&self) {
        self.with_work(Work::set_progress_to_max);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.with_work(|work| work.set_title(title));
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_work(|work| work.set_message(message));
    }

    fn with_work(&self, apply: impl FnOnce(&Work)) {
        match self.work() {
            Some(work) => apply(&work),
            None => debug!(work = %self.name, "progress update for unknown work ignored"),
        }
    }
}
