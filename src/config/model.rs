// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::PoolKind;
use crate::work::DEFAULT_SEPARATOR;

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// parallelism = 4
/// separator = "."
///
/// [job.calibrate]
/// title = "Calibrate detector"
/// steps = 3
/// step = "50ms"
/// pool = "serial"
///
/// [job.acquire]
/// group = "measure"
/// after = ["calibrate"]
/// steps = 5
/// ```
///
/// All sections are optional at this level; validation requires at least one
/// job.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    /// Manager settings from `[engine]`.
    #[serde(default)]
    pub engine: EngineSection,

    /// All jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// Validated plan. Obtain one through `PlanFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub engine: EngineConfig,
    pub job: BTreeMap<String, JobConfig>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(engine: EngineConfig, job: BTreeMap<String, JobConfig>) -> Self {
        Self { engine, job }
    }

    /// Name of the tree node tracking `job`.
    pub fn tree_name(&self, job: &str) -> String {
        match self.job.get(job).and_then(|j| j.group.as_deref()) {
            Some(group) => format!("{group}{}{job}", self.engine.separator),
            None => job.to_string(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Maximum number of parallel-pool jobs running at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Capacity of the serial pool queue.
    #[serde(default = "default_serial_queue_length")]
    pub serial_queue_length: usize,

    /// Single character joining hierarchical work names.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Buffer size of the manager's event broadcast.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_serial_queue_length() -> usize {
    32
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            serial_queue_length: default_serial_queue_length(),
            separator: default_separator(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Validated manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub parallelism: usize,
    pub serial_queue_length: usize,
    pub separator: char,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            serial_queue_length: default_serial_queue_length(),
            separator: DEFAULT_SEPARATOR,
            event_capacity: default_event_capacity(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Shown as the node title.
    #[serde(default)]
    pub title: Option<String>,

    /// Tree prefix; the job's node becomes `<group><sep><name>`.
    #[serde(default)]
    pub group: Option<String>,

    /// Jobs that must succeed before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    /// Number of progress steps.
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Duration of each step, e.g. `"100ms"`.
    #[serde(default)]
    pub step: Option<String>,

    #[serde(default)]
    pub pool: PoolKind,

    /// Fail deliberately when reaching this step (1-based).
    #[serde(default)]
    pub fail_at_step: Option<u32>,
}

fn default_steps() -> u32 {
    1
}

impl JobConfig {
    /// Step duration; validation guarantees it parses.
    pub fn step_duration(&self) -> Duration {
        self.step
            .as_deref()
            .and_then(|s| crate::types::parse_duration(s).ok())
            .unwrap_or(Duration::ZERO)
    }

    pub fn display_title<'a>(&'a self, name: &'a str) -> &'a str {
        self.title.as_deref().unwrap_or(name)
    }
}
