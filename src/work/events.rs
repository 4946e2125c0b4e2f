// src/work/events.rs

//! Change notifications emitted by work nodes.
//!
//! Aggregates (progress, done) are recomputed on every read; events only tell
//! observers that a re-read is worthwhile. An event raised on a node is
//! delivered to that node's listeners and then to every ancestor's.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkEventKind {
    /// Own progress or max progress changed.
    Progress,
    /// Title, message or handle changed.
    Status,
    /// A child was added or removed.
    Structure,
    /// The node's handle finished.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkEvent {
    /// Full name of the node where the change happened.
    pub path: String,
    pub kind: WorkEventKind,
}

impl WorkEvent {
    pub fn new(path: impl Into<String>, kind: WorkEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Listener callback registered on a node.
pub type WorkListener = Arc<dyn Fn(&WorkEvent) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
