#![allow(dead_code)]

use std::collections::BTreeMap;

use goalwork::config::{EngineSection, JobConfig, PlanFile, RawPlanFile};
use goalwork::errors::EngineError;
use goalwork::types::PoolKind;

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                engine: EngineSection::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.plan.job.insert(name.to_string(), job);
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.plan.engine.parallelism = n;
        self
    }

    pub fn serial_queue_length(mut self, n: usize) -> Self {
        self.plan.engine.serial_queue_length = n;
        self
    }

    pub fn separator(mut self, sep: &str) -> Self {
        self.plan.engine.separator = sep.to_string();
        self
    }

    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn try_build(self) -> Result<PlanFile, EngineError> {
        PlanFile::try_from(self.plan)
    }

    pub fn build(self) -> PlanFile {
        self.try_build()
            .expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            job: JobConfig {
                title: None,
                group: None,
                after: vec![],
                steps: 1,
                step: None,
                pool: PoolKind::Parallel,
                fail_at_step: None,
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.job.title = Some(title.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.job.group = Some(group.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.job.steps = steps;
        self
    }

    pub fn step(mut self, duration: &str) -> Self {
        self.job.step = Some(duration.to_string());
        self
    }

    pub fn serial(mut self) -> Self {
        self.job.pool = PoolKind::Serial;
        self
    }

    pub fn fail_at_step(mut self, step: u32) -> Self {
        self.job.fail_at_step = Some(step);
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
