// src/work/node.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::errors::{EngineError, Result};
use crate::work::events::{ListenerId, WorkEvent, WorkEventKind, WorkListener};
use crate::work::handle::WorkHandle;
use crate::work::path::{join_name, split_name};
use crate::work::snapshot::WorkSnapshot;

/// Separator used when none is configured.
pub const DEFAULT_SEPARATOR: char = '.';

/// Own (non-aggregated) counters and text of a node.
#[derive(Debug, Clone, Default)]
struct Status {
    progress: f64,
    max_progress: f64,
    title: String,
    message: String,
}

pub(crate) struct WorkNode {
    name: String,
    full_name: String,
    separator: char,
    parent: Weak<WorkNode>,
    handle: Mutex<Option<Arc<dyn WorkHandle>>>,
    status: Mutex<Status>,
    children: Mutex<BTreeMap<String, Arc<WorkNode>>>,
    listeners: Mutex<Vec<(ListenerId, WorkListener)>>,
}

/// One node of the named progress tree.
///
/// A node optionally owns a [`WorkHandle`] (the work itself) and any number
/// of named children. Aggregates are never cached:
///
/// - [`Work::progress`] / [`Work::max_progress`] are the node's own counters
///   plus the recursive sums over all children;
/// - [`Work::is_done`] holds iff the own handle (if any) is done and every
///   child is done.
///
/// Each node guards its own fields; no lock is held while calling into
/// another node or a handle.
#[derive(Clone)]
pub struct Work {
    node: Arc<WorkNode>,
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("full_name", &self.node.full_name)
            .field("progress", &self.progress())
            .field("max_progress", &self.max_progress())
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

impl Work {
    /// Create a detached root node using `separator` for hierarchical names.
    pub fn root(separator: char) -> Self {
        Self {
            node: Arc::new(WorkNode::new(String::new(), String::new(), separator, Weak::new())),
        }
    }

    pub(crate) fn from_node(node: Arc<WorkNode>) -> Self {
        Self { node }
    }

    pub(crate) fn downgrade(&self) -> Weak<WorkNode> {
        Arc::downgrade(&self.node)
    }

    /// Last segment of the name (empty for the root).
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Separator-joined path from the root.
    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn separator(&self) -> char {
        self.node.separator
    }

    pub fn parent(&self) -> Option<Work> {
        self.node.parent.upgrade().map(Work::from_node)
    }

    pub fn handle(&self) -> Option<Arc<dyn WorkHandle>> {
        lock(&self.node.handle).clone()
    }

    pub fn has_handle(&self) -> bool {
        lock(&self.node.handle).is_some()
    }

    /// Address `name` below this node, creating placeholder nodes for missing
    /// segments, and attach `handle` to the final node if given.
    ///
    /// Fails with [`EngineError::NameConflict`] if the final node's current
    /// handle has not finished yet. A finished node is reused: it gets the
    /// new handle, its own counters and texts are reset, children are kept.
    pub fn add_child(&self, name: &str, handle: Option<Arc<dyn WorkHandle>>) -> Result<Work> {
        let segments = split_name(name, self.node.separator)?;

        loop {
            let mut current = Arc::clone(&self.node);
            for segment in &segments {
                current = WorkNode::child_or_insert(&current, segment);
            }

            if let Some(handle) = handle.as_ref() {
                WorkNode::attach(&current, Arc::clone(handle))?;
            }

            // A concurrent cleanup may have unlinked a still empty node on the
            // path before the handle landed. Pending nodes are never removed,
            // so once linked the work stays reachable.
            if current.is_done() || current.is_linked_under(&self.node) {
                return Ok(Work::from_node(current));
            }
            trace!(work = %current.full_name, "work node unlinked while adding; retrying");
        }
    }

    /// Look up `name` below this node. Never creates nodes.
    pub fn find(&self, name: &str) -> Option<Work> {
        let segments = match split_name(name, self.node.separator) {
            Ok(segments) => segments,
            Err(err) => {
                debug!(work = %self.node.full_name, error = %err, "invalid lookup name");
                return None;
            }
        };

        let mut current = Arc::clone(&self.node);
        for segment in segments {
            let next = lock(&current.children).get(segment).cloned()?;
            current = next;
        }
        Some(Work::from_node(current))
    }

    /// Direct children in name order.
    pub fn children(&self) -> Vec<Work> {
        self.node
            .child_nodes()
            .into_iter()
            .map(Work::from_node)
            .collect()
    }

    /// Cancel the own handle and, recursively, every descendant's.
    pub fn cancel(&self, interrupt: bool) {
        self.node.cancel(interrupt);
    }

    /// Recursively drop children that are done. The node itself stays.
    pub fn cleanup(&self) {
        self.node.cleanup();
    }

    pub fn is_done(&self) -> bool {
        self.node.is_done()
    }

    /// Own progress plus the progress of all descendants.
    pub fn progress(&self) -> f64 {
        self.node.progress()
    }

    /// Own maximum plus the maxima of all descendants.
    pub fn max_progress(&self) -> f64 {
        self.node.max_progress()
    }

    pub fn own_progress(&self) -> f64 {
        lock(&self.node.status).progress
    }

    pub fn own_max_progress(&self) -> f64 {
        lock(&self.node.status).max_progress
    }

    pub fn title(&self) -> String {
        lock(&self.node.status).title.clone()
    }

    pub fn message(&self) -> String {
        lock(&self.node.status).message.clone()
    }

    pub fn set_progress(&self, progress: f64) {
        self.update_status(WorkEventKind::Progress, |s| s.progress = progress);
    }

    pub fn increase_progress(&self, delta: f64) {
        self.update_status(WorkEventKind::Progress, |s| s.progress += delta);
    }

    pub fn set_max_progress(&self, max_progress: f64) {
        self.update_status(WorkEventKind::Progress, |s| s.max_progress = max_progress);
    }

    /// Mark the node's own work as fully progressed.
    pub fn set_progress_to_max(&self) {
        self.update_status(WorkEventKind::Progress, |s| s.progress = s.max_progress);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.update_status(WorkEventKind::Status, |s| s.title = title);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update_status(WorkEventKind::Status, |s| s.message = message);
    }

    /// Listen for changes of this node and all its descendants.
    pub fn subscribe(&self, listener: impl Fn(&WorkEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId::next();
        lock(&self.node.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered here.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.node.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn clear_listeners(&self) {
        lock(&self.node.listeners).clear();
    }

    /// Immutable view of this subtree.
    pub fn snapshot(&self) -> WorkSnapshot {
        self.node.snapshot()
    }

    fn update_status(&self, kind: WorkEventKind, apply: impl FnOnce(&mut Status)) {
        apply(&mut lock(&self.node.status));
        self.node
            .emit(&WorkEvent::new(self.node.full_name.clone(), kind));
    }
}

impl WorkNode {
    fn new(name: String, full_name: String, separator: char, parent: Weak<WorkNode>) -> Self {
        Self {
            name,
            full_name,
            separator,
            parent,
            handle: Mutex::new(None),
            status: Mutex::new(Status::default()),
            children: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn child_nodes(&self) -> Vec<Arc<WorkNode>> {
        lock(&self.children).values().cloned().collect()
    }

    /// Whether `child` is still linked under this node.
    fn holds(&self, child: &WorkNode) -> bool {
        lock(&self.children)
            .get(&child.name)
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), child))
    }

    /// Whether the chain of parents from this node up to `ancestor` is intact.
    fn is_linked_under(self: &Arc<Self>, ancestor: &Arc<WorkNode>) -> bool {
        let mut current = Arc::clone(self);
        while !Arc::ptr_eq(&current, ancestor) {
            let Some(parent) = current.parent.upgrade() else {
                return false;
            };
            if !parent.holds(&current) {
                return false;
            }
            current = parent;
        }
        true
    }

    fn child_or_insert(this: &Arc<WorkNode>, segment: &str) -> Arc<WorkNode> {
        let (child, created) = {
            let mut children = lock(&this.children);
            match children.get(segment) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let child = Arc::new(WorkNode::new(
                        segment.to_string(),
                        join_name(&this.full_name, segment, this.separator),
                        this.separator,
                        Arc::downgrade(this),
                    ));
                    children.insert(segment.to_string(), Arc::clone(&child));
                    (child, true)
                }
            }
        };

        if created {
            trace!(work = %child.full_name, "created work node");
            this.emit(&WorkEvent::new(child.full_name.clone(), WorkEventKind::Structure));
        }
        child
    }

    fn attach(this: &Arc<WorkNode>, handle: Arc<dyn WorkHandle>) -> Result<()> {
        {
            let mut slot = lock(&this.handle);
            if let Some(existing) = slot.as_ref() {
                if !existing.is_done() {
                    return Err(EngineError::NameConflict(this.full_name.clone()));
                }
                debug!(work = %this.full_name, "replacing finished work");
                *lock(&this.status) = Status::default();
            }
            *slot = Some(Arc::clone(&handle));
        }

        let weak = Arc::downgrade(this);
        handle.on_done(Box::new(move || {
            if let Some(node) = weak.upgrade() {
                trace!(work = %node.full_name, "work handle finished");
                node.emit(&WorkEvent::new(node.full_name.clone(), WorkEventKind::Done));
            }
        }));

        this.emit(&WorkEvent::new(this.full_name.clone(), WorkEventKind::Status));
        Ok(())
    }

    fn emit(&self, event: &WorkEvent) {
        let listeners: Vec<WorkListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }

        if let Some(parent) = self.parent.upgrade() {
            if parent.holds(self) {
                parent.emit(event);
            }
        }
    }

    fn is_done(&self) -> bool {
        let own = lock(&self.handle).clone();
        if own.is_some_and(|handle| !handle.is_done()) {
            return false;
        }
        self.child_nodes().iter().all(|child| child.is_done())
    }

    fn progress(&self) -> f64 {
        let own = lock(&self.status).progress;
        own + self
            .child_nodes()
            .iter()
            .map(|child| child.progress())
            .sum::<f64>()
    }

    fn max_progress(&self) -> f64 {
        let own = lock(&self.status).max_progress;
        own + self
            .child_nodes()
            .iter()
            .map(|child| child.max_progress())
            .sum::<f64>()
    }

    fn cancel(&self, interrupt: bool) {
        let own = lock(&self.handle).clone();
        if let Some(handle) = own {
            debug!(work = %self.full_name, interrupt, "cancelling work");
            handle.cancel(interrupt);
        }
        for child in self.child_nodes() {
            child.cancel(interrupt);
        }
    }

    fn cleanup(&self) {
        // Decide under the children lock so nothing can be attached between
        // the done check and the removal. Locks are taken parent first.
        let removed: Vec<String> = {
            let mut children = lock(&self.children);
            let mut removed = Vec::new();
            children.retain(|_, child| {
                let done = child.is_done();
                if done {
                    removed.push(child.full_name.clone());
                }
                !done
            });
            removed
        };
        for path in removed {
            debug!(work = %path, "removed finished work");
            self.emit(&WorkEvent::new(path, WorkEventKind::Structure));
        }

        for child in self.child_nodes() {
            child.cleanup();
        }
    }

    fn snapshot(&self) -> WorkSnapshot {
        let status = lock(&self.status).clone();
        let own = lock(&self.handle).clone();
        let children: Vec<WorkSnapshot> = self
            .child_nodes()
            .iter()
            .map(|child| child.snapshot())
            .collect();

        let own_done = own.as_ref().is_none_or(|handle| handle.is_done());
        WorkSnapshot {
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            title: status.title,
            message: status.message,
            progress: status.progress + children.iter().map(|c| c.progress).sum::<f64>(),
            max_progress: status.max_progress
                + children.iter().map(|c| c.max_progress).sum::<f64>(),
            has_handle: own.is_some(),
            failed: own.as_ref().is_some_and(|handle| handle.is_failed()),
            done: own_done && children.iter().all(|c| c.done),
            children,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
