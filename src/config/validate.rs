// src/config/validate.rs

use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{EngineConfig, EngineSection, JobConfig, PlanFile, RawPlanFile};
use crate::errors::{EngineError, Result};
use crate::types::parse_duration;

/// Job names and group segments: letters, digits, `_` and `-`.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static name pattern is valid"));

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = EngineError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        let engine = EngineConfig::try_from(raw.engine.clone())?;
        validate_raw_plan(&raw, engine.separator)?;
        Ok(PlanFile::new_unchecked(engine, raw.job))
    }
}

impl TryFrom<EngineSection> for EngineConfig {
    type Error = EngineError;

    fn try_from(section: EngineSection) -> std::result::Result<Self, Self::Error> {
        if section.parallelism == 0 {
            return Err(EngineError::ConfigError(
                "[engine].parallelism must be >= 1 (got 0)".to_string(),
            ));
        }
        if section.serial_queue_length == 0 {
            return Err(EngineError::ConfigError(
                "[engine].serial_queue_length must be >= 1 (got 0)".to_string(),
            ));
        }
        if section.event_capacity == 0 {
            return Err(EngineError::ConfigError(
                "[engine].event_capacity must be >= 1 (got 0)".to_string(),
            ));
        }

        let mut chars = section.separator.chars();
        let separator = match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_alphanumeric() && !c.is_whitespace() && c != '_' && c != '-' => c,
            _ => {
                return Err(EngineError::ConfigError(format!(
                    "[engine].separator must be a single punctuation character (got {:?})",
                    section.separator
                )));
            }
        };

        Ok(EngineConfig {
            parallelism: section.parallelism,
            serial_queue_length: section.serial_queue_length,
            separator,
            event_capacity: section.event_capacity,
        })
    }
}

fn validate_raw_plan(plan: &RawPlanFile, separator: char) -> Result<()> {
    ensure_has_jobs(plan)?;
    for (name, job) in plan.job.iter() {
        validate_job(name, job, separator)?;
    }
    validate_job_dependencies(plan)?;
    validate_dag(plan)?;
    Ok(())
}

fn ensure_has_jobs(plan: &RawPlanFile) -> Result<()> {
    if plan.job.is_empty() {
        return Err(EngineError::ConfigError(
            "plan must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_job(name: &str, job: &JobConfig, separator: char) -> Result<()> {
    if !NAME_PATTERN.is_match(name) {
        return Err(EngineError::ConfigError(format!(
            "job name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }

    if let Some(group) = job.group.as_deref() {
        if group.split(separator).any(|segment| !NAME_PATTERN.is_match(segment)) {
            return Err(EngineError::ConfigError(format!(
                "job '{name}' has invalid group '{group}'"
            )));
        }
    }

    if job.steps == 0 {
        return Err(EngineError::ConfigError(format!(
            "job '{name}' must have steps >= 1"
        )));
    }

    if let Some(step) = job.step.as_deref() {
        parse_duration(step).map_err(|e| {
            EngineError::ConfigError(format!("job '{name}' has invalid step: {e}"))
        })?;
    }

    if let Some(fail_at) = job.fail_at_step {
        if fail_at == 0 || fail_at > job.steps {
            return Err(EngineError::ConfigError(format!(
                "job '{name}' has fail_at_step = {fail_at} outside 1..={}",
                job.steps
            )));
        }
    }

    Ok(())
}

fn validate_job_dependencies(plan: &RawPlanFile) -> Result<()> {
    for (name, job) in plan.job.iter() {
        for dep in job.after.iter() {
            if !plan.job.contains_key(dep) {
                return Err(EngineError::ConfigError(format!(
                    "job '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(EngineError::ConfigError(format!(
                    "job '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(plan: &RawPlanFile) -> Result<()> {
    // Edge direction: dep -> job.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in plan.job.keys() {
        graph.add_node(name.as_str());
    }

    for (name, job) in plan.job.iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(EngineError::PlanCycle(format!(
            "cycle detected in job graph involving job '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<PlanFile> {
        let raw: RawPlanFile = toml::from_str(toml_src)?;
        PlanFile::try_from(raw)
    }

    #[test]
    fn accepts_minimal_plan() {
        let plan = parse("[job.a]\n").unwrap();
        assert_eq!(plan.engine.separator, '.');
        assert_eq!(plan.job["a"].steps, 1);
    }

    #[test]
    fn rejects_empty_plan() {
        assert!(matches!(parse(""), Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn rejects_unknown_and_self_dependencies() {
        assert!(parse("[job.a]\nafter = [\"b\"]\n").is_err());
        assert!(parse("[job.a]\nafter = [\"a\"]\n").is_err());
    }

    #[test]
    fn rejects_cycles() {
        let res = parse("[job.a]\nafter = [\"b\"]\n[job.b]\nafter = [\"a\"]\n");
        assert!(matches!(res, Err(EngineError::PlanCycle(_))));
    }

    #[test]
    fn rejects_bad_separator() {
        for sep in ["", "..", "a", " "] {
            let src = format!("[engine]\nseparator = {sep:?}\n[job.a]\n");
            assert!(parse(&src).is_err(), "separator {sep:?} should be rejected");
        }
        assert_eq!(parse("[engine]\nseparator = \"/\"\n[job.a]\n").unwrap().engine.separator, '/');
    }

    #[test]
    fn rejects_bad_job_shapes() {
        assert!(parse("[job.\"a.b\"]\n").is_err());
        assert!(parse("[job.a]\nsteps = 0\n").is_err());
        assert!(parse("[job.a]\nsteps = 2\nfail_at_step = 3\n").is_err());
        assert!(parse("[job.a]\nstep = \"soon\"\n").is_err());
        assert!(parse("[job.a]\ngroup = \"x..y\"\n").is_err());
        assert!(parse("[engine]\nparallelism = 0\n[job.a]\n").is_err());
    }

    #[test]
    fn tree_name_uses_group_and_separator() {
        let plan = parse("[engine]\nseparator = \"/\"\n[job.a]\ngroup = \"m/x\"\n[job.b]\n").unwrap();
        assert_eq!(plan.tree_name("a"), "m/x/a");
        assert_eq!(plan.tree_name("b"), "b");
    }
}
