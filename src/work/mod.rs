// src/work/mod.rs

//! Named progress tree.
//!
//! - [`node`] holds [`Work`], one node of the tree.
//! - [`handle`] defines what a node can own ([`WorkHandle`]) and the
//!   [`TaskHandle`] used for pool-spawned work.
//! - [`callback`] is the narrow progress reporter handed to running work.
//! - [`events`] carries change notifications up the tree.
//! - [`path`] splits and joins hierarchical names.
//! - [`snapshot`] is an immutable copy used for reporting.

pub mod callback;
pub mod events;
pub mod handle;
pub mod node;
pub mod path;
pub mod snapshot;

pub use callback::WorkCallback;
pub use events::{ListenerId, WorkEvent, WorkEventKind, WorkListener};
pub use handle::{DoneCallback, TaskHandle, TaskStatus, WorkHandle};
pub use node::{DEFAULT_SEPARATOR, Work};
pub use snapshot::WorkSnapshot;
