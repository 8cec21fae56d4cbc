// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{OmwsError, Result};
use crate::types::{JobType, Role};

/// One job of an experiment as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedJob {
    /// Client-chosen id, unique within the plan.
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Request template. Placeholders are filled from dependencies.
    #[serde(default)]
    pub parameters: Value,
    /// Dependencies: job id → role its output plays in this job.
    #[serde(default)]
    pub depends_on: BTreeMap<String, Role>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub jobs: Vec<PlannedJob>,
}

/// Validated experiment DAG keyed by job id.
///
/// Construction fails on anything that would leave a member that can never
/// run: unknown references, self edges, cycles.
#[derive(Debug, Clone)]
pub struct ExperimentGraph {
    /// Job ids in a topological order (dependencies first).
    order: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
}

impl ExperimentGraph {
    pub fn build(plan: &ExperimentPlan) -> Result<Self> {
        if plan.jobs.is_empty() {
            return Err(invalid("experiment must contain at least one job"));
        }

        let mut seen = HashSet::new();
        for job in &plan.jobs {
            if job.id.trim().is_empty() {
                return Err(invalid("job id must not be empty"));
            }
            if job.id.contains([',', '\n', '\r']) {
                return Err(invalid(format!("job id {:?} contains a reserved character", job.id)));
            }
            if !seen.insert(job.id.as_str()) {
                return Err(invalid(format!("duplicate job id '{}'", job.id)));
            }
            if job.job_type == JobType::Experiment {
                return Err(invalid(format!(
                    "job '{}': experiments cannot be nested",
                    job.id
                )));
            }
        }

        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for job in &plan.jobs {
            graph.add_node(job.id.as_str());
        }
        for job in &plan.jobs {
            for dep in job.depends_on.keys() {
                if dep == &job.id {
                    return Err(invalid(format!("job '{}' cannot depend on itself", job.id)));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(invalid(format!(
                        "broken dependency: job '{}' depends on unknown job '{}'",
                        job.id, dep
                    )));
                }
                graph.add_edge(dep.as_str(), job.id.as_str(), ());
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            Err(cycle) => {
                return Err(OmwsError::DagCycle(format!(
                    "cycle detected in experiment involving job '{}'",
                    cycle.node_id()
                )));
            }
        };

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        // Plan order keeps NEXT lists stable across runs.
        for job in &plan.jobs {
            for dep in job.depends_on.keys() {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(job.id.clone());
            }
        }

        Ok(Self { order, dependents })
    }

    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Jobs that list `id` in their `depends_on`.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

fn invalid(msg: impl Into<String>) -> OmwsError {
    OmwsError::InvalidRequest(msg.into())
}
