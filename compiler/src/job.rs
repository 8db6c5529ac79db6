//! CI job model and the job dependency graph.
//!
//! A [`JobGraph`] is an insertion-ordered registry of [`Job`]s keyed by name.
//! Jobs are added during compilation and wired with `needs` edges; the graph
//! is then validated (no dangling dependency, no cycle) and never mutated
//! again.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::core::error::CompileError;
use crate::core::permissions::Permissions;

pub const PRE_ACTIVATION_JOB: &str = "pre_activation";
pub const ACTIVATION_JOB: &str = "activation";
pub const AGENT_JOB: &str = "agent";
pub const DETECTION_JOB: &str = "detection";
pub const CONCLUSION_JOB: &str = "conclusion";

/// Job names the compiler creates itself.
pub const BUILTIN_JOBS: &[&str] = &[
    PRE_ACTIVATION_JOB,
    ACTIVATION_JOB,
    AGENT_JOB,
    DETECTION_JOB,
    CONCLUSION_JOB,
];

/// One step of a job. Either `uses` or `run` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Step {
    pub fn uses(name: &str, action: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            uses: Some(action.to_string()),
            ..Self::default()
        }
    }

    pub fn run(name: &str, script: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            run: Some(script.to_string()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_if(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_input(mut self, key: &str, value: impl Into<String>) -> Self {
        self.with.insert(key.to_string(), value.into());
        self
    }

    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    /// Every piece of free text in the step.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.name
            .iter()
            .chain(&self.condition)
            .chain(&self.uses)
            .chain(&self.run)
            .map(String::as_str)
            .chain(self.with.values().map(String::as_str))
            .chain(self.env.values().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Job {
    #[serde(skip)]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    pub permissions: Permissions,
    #[serde(rename = "timeout-minutes", skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(name: &str, runs_on: &str) -> Self {
        Self {
            name: name.to_string(),
            runs_on: runs_on.to_string(),
            ..Self::default()
        }
    }

    /// Add a dependency unless already present.
    pub fn add_need(&mut self, job: &str) {
        if !self.needs.iter().any(|need| need == job) {
            self.needs.push(job.to_string());
        }
    }

    pub fn needs_job(&self, job: &str) -> bool {
        self.needs.iter().any(|need| need == job)
    }

    /// Condition, step, env, and output text, for reference scanning.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.condition
            .iter()
            .map(String::as_str)
            .chain(self.env.values().map(String::as_str))
            .chain(self.outputs.values().map(String::as_str))
            .chain(self.steps.iter().flat_map(Step::texts))
    }
}

/// Insertion-ordered job registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobGraph {
    order: Vec<String>,
    jobs: BTreeMap<String, Job>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&mut self, job: Job) -> Result<(), CompileError> {
        if job.name.is_empty() {
            return Err(CompileError::graph("job name cannot be empty", &[]));
        }
        if self.jobs.contains_key(&job.name) {
            return Err(CompileError::graph(
                format!("job '{}' already exists", job.name),
                &[job.name.as_str()],
            ));
        }
        self.order.push(job.name.clone());
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Job names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Jobs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|name| self.jobs.get(name))
    }

    /// Check that every dependency exists and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), CompileError> {
        for job in self.iter() {
            for need in &job.needs {
                if !self.jobs.contains_key(need) {
                    return Err(CompileError::graph(
                        format!("job '{}' depends on non-existent job '{}'", job.name, need),
                        &[job.name.as_str(), need.as_str()],
                    ));
                }
            }
        }
        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), CompileError> {
        let mut done: BTreeSet<&str> = BTreeSet::new();
        for start in self.jobs.keys() {
            let mut stack: Vec<&str> = Vec::new();
            if let Some(cycle) = self.find_cycle(start, &mut stack, &mut done) {
                let jobs: Vec<&str> = cycle[..cycle.len() - 1].to_vec();
                return Err(CompileError::graph(
                    format!(
                        "cycle detected in job dependencies: job '{}' has circular dependency through '{}' ({})",
                        cycle[cycle.len() - 2],
                        cycle[cycle.len() - 1],
                        cycle.join(" -> ")
                    ),
                    &jobs,
                ));
            }
        }
        Ok(())
    }

    /// Depth-first search; returns the closed cycle path when one is found.
    fn find_cycle<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> Option<Vec<&'a str>> {
        if done.contains(name) {
            return None;
        }
        if let Some(pos) = stack.iter().position(|entry| *entry == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name);
            return Some(cycle);
        }
        stack.push(name);
        if let Some(job) = self.jobs.get(name) {
            let mut needs: Vec<&str> = job.needs.iter().map(String::as_str).collect();
            needs.sort_unstable();
            for need in needs {
                if let Some(cycle) = self.find_cycle(need, stack, done) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        done.insert(name);
        None
    }

    /// Dependency order (Kahn's algorithm, ties broken by name).
    pub fn topological_order(&self) -> Result<Vec<String>, CompileError> {
        self.validate()?;
        let mut in_degree: BTreeMap<&str, usize> = self
            .jobs
            .values()
            .map(|job| (job.name.as_str(), job.needs.len()))
            .collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for job in self.jobs.values() {
            for need in &job.needs {
                dependents
                    .entry(need.as_str())
                    .or_default()
                    .push(job.name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.jobs.len());
        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
        Ok(order)
    }

    /// Mermaid flowchart of the dependency edges.
    pub fn mermaid(&self) -> String {
        let mut lines = vec!["graph LR".to_string()];
        for job in self.iter() {
            if job.needs.is_empty() {
                lines.push(format!("  {}", job.name));
            }
            for need in &job.needs {
                lines.push(format!("  {} --> {}", need, job.name));
            }
        }
        lines.join("\n")
    }
}

impl Serialize for JobGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for job in self.iter() {
            map.serialize_entry(&job.name, job)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn job(name: &str, needs: &[&str]) -> Job {
        let mut job = Job::new(name, "ubuntu-latest");
        for need in needs {
            job.add_need(need);
        }
        job
    }

    fn graph(jobs: Vec<Job>) -> JobGraph {
        let mut graph = JobGraph::new();
        for job in jobs {
            graph.add_job(job).expect("add job");
        }
        graph
    }

    #[test]
    fn add_job_rejects_empty_and_duplicate_names() {
        let mut graph = JobGraph::new();
        let err = graph.add_job(job("", &[])).expect_err("empty");
        assert_eq!(err.to_string(), "job graph integrity error: job name cannot be empty");

        graph.add_job(job("agent", &[])).expect("add");
        let err = graph.add_job(job("agent", &[])).expect_err("duplicate");
        assert_eq!(
            err.to_string(),
            "job graph integrity error: job 'agent' already exists"
        );
    }

    #[test]
    fn add_need_deduplicates() {
        let mut job = job("a", &["agent"]);
        job.add_need("agent");
        assert_eq!(job.needs, vec!["agent"]);
    }

    #[test]
    fn validate_reports_dangling_dependency() {
        let graph = graph(vec![job("a", &["ghost"])]);
        let err = graph.validate().expect_err("dangling");
        assert_eq!(
            err.to_string(),
            "job graph integrity error: job 'a' depends on non-existent job 'ghost'"
        );
    }

    #[test]
    fn validate_reports_cycle_with_both_jobs() {
        let graph = graph(vec![
            job("agent", &[]),
            job("x", &["agent", "y"]),
            job("y", &["agent", "x"]),
        ]);
        let err = graph.validate().expect_err("cycle");
        assert_eq!(err.kind(), ErrorKind::GraphIntegrityError);
        assert_eq!(
            err.to_string(),
            "job graph integrity error: cycle detected in job dependencies: job 'y' has circular dependency through 'x' (x -> y -> x)"
        );
        match err {
            CompileError::GraphIntegrity { jobs, .. } => assert_eq!(jobs, vec!["x", "y"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph(vec![job("a", &["a"])]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn topological_order_breaks_ties_by_name() {
        let graph = graph(vec![
            job("activation", &[]),
            job("agent", &["activation"]),
            job("create_issue", &["agent"]),
            job("add_comment", &["agent", "create_issue"]),
            job("conclusion", &["agent", "add_comment", "create_issue"]),
        ]);
        assert_eq!(
            graph.topological_order().expect("order"),
            vec!["activation", "agent", "create_issue", "add_comment", "conclusion"]
        );
    }

    #[test]
    fn mermaid_lists_edges_in_insertion_order() {
        let graph = graph(vec![job("activation", &[]), job("agent", &["activation"])]);
        assert_eq!(graph.mermaid(), "graph LR\n  activation\n  activation --> agent");
    }

    #[test]
    fn serializes_in_insertion_order() {
        let graph = graph(vec![job("b", &[]), job("a", &["b"])]);
        let json = serde_json::to_string(&graph).expect("serialize");
        assert!(json.find("\"b\"").expect("b") < json.find("\"a\"").expect("a"));
    }
}
