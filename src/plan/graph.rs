// src/plan/graph.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::PlanFile;
use crate::errors::{EngineError, Result};

/// Immediate deps and dependents of one job.
#[derive(Debug, Clone, Default)]
struct PlanNode {
    /// Jobs listed in `after`.
    deps: Vec<String>,
    /// Jobs listing this one in their `after`.
    dependents: Vec<String>,
}

/// Adjacency view of a validated plan, keyed by job name.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    nodes: BTreeMap<String, PlanNode>,
}

impl PlanGraph {
    /// Assumes every `after` reference exists (validation checks this).
    pub fn from_plan(plan: &PlanFile) -> Self {
        let mut nodes: BTreeMap<String, PlanNode> = plan
            .job
            .iter()
            .map(|(name, job)| {
                (
                    name.clone(),
                    PlanNode {
                        deps: job.after.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for (name, job) in plan.job.iter() {
            for dep in &job.after {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Jobs without `after`.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.deps.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every job after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(str::to_string).collect())
            .map_err(|cycle| EngineError::PlanCycle(cycle.node_id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{EngineConfig, JobConfig};
    use crate::types::PoolKind;

    fn job(after: &[&str]) -> JobConfig {
        JobConfig {
            title: None,
            group: None,
            after: after.iter().map(|s| s.to_string()).collect(),
            steps: 1,
            step: None,
            pool: PoolKind::Parallel,
            fail_at_step: None,
        }
    }

    fn plan(jobs: &[(&str, &[&str])]) -> PlanFile {
        let job = jobs
            .iter()
            .map(|(name, after)| (name.to_string(), job(after)))
            .collect::<BTreeMap<_, _>>();
        PlanFile::new_unchecked(EngineConfig::default(), job)
    }

    #[test]
    fn tracks_dependents() {
        let graph = PlanGraph::from_plan(&plan(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));
        assert_eq!(graph.dependents_of("a"), ["b".to_string(), "c".to_string()]);
        assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
        assert_eq!(graph.roots(), vec!["a"]);
    }

    #[test]
    fn orders_dependencies_first() {
        let graph = PlanGraph::from_plan(&plan(&[
            ("deploy", &["build", "test"]),
            ("test", &["build"]),
            ("build", &[]),
        ]));
        let order = graph.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("build") < pos("test"));
        assert!(pos("test") < pos("deploy"));
    }

    #[test]
    fn reports_cycles() {
        let graph = PlanGraph::from_plan(&plan(&[("a", &["b"]), ("b", &["a"])]));
        assert!(matches!(
            graph.topological_order(),
            Err(EngineError::PlanCycle(_))
        ));
    }
}
