// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Execution-graph model: builds a DAG from a workflow's `dependsOn`
//! edges, enforces the node state machine, and computes the critical
//! path. See SPEC_FULL.md §4.F.

use crate::error::{OrchestratorError, Result};
use crate::workflow::Workflow;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Waiting,
    Running,
    Succeeded,
    Failed,
}

impl NodeState {
    /// The state machine's legal transition table. `Waiting` is reached
    /// from `Pending` once a node's dependencies start resolving;
    /// `Running` once all dependencies have succeeded; terminal states
    /// do not transition further.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, Waiting)
                | (Pending, Running)
                | (Pending, Failed)
                | (Waiting, Running)
                | (Waiting, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub step_name: String,
    pub state: NodeState,
}

/// The execution graph for one workflow run: one node per step, one
/// edge per `dependsOn` entry directed from dependency to dependent.
#[derive(Debug)]
pub struct ExecutionDag {
    graph: DiGraph<GraphNode, ()>,
    index_by_name: HashMap<String, NodeIndex>,
}

impl ExecutionDag {
    pub fn from_workflow(workflow: &Workflow) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index_by_name = HashMap::new();

        for step in &workflow.steps {
            let idx = graph.add_node(GraphNode {
                step_name: step.name.clone(),
                state: NodeState::Pending,
            });
            index_by_name.insert(step.name.clone(), idx);
        }

        for step in &workflow.steps {
            let dependent_idx = index_by_name[&step.name];
            for dep in &step.depends_on {
                let dep_idx = *index_by_name.get(dep).ok_or_else(|| {
                    OrchestratorError::Configuration(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.name, dep
                    ))
                })?;
                graph.add_edge(dep_idx, dependent_idx, ());
            }
        }

        let dag = Self {
            graph,
            index_by_name,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    fn check_acyclic(&self) -> Result<()> {
        if toposort(&self.graph, None).is_err() {
            let sccs = kosaraju_scc(&self.graph);
            let cyclic: Vec<String> = sccs
                .into_iter()
                .filter(|scc| scc.len() > 1)
                .flat_map(|scc| scc.into_iter().map(|idx| self.graph[idx].step_name.clone()))
                .collect();
            return Err(OrchestratorError::Cycle(cyclic.join(", ")));
        }
        Ok(())
    }

    /// Steps in a valid execution order (dependencies before dependents).
    pub fn topo_order(&self) -> Result<Vec<String>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx].step_name.clone()).collect())
            .map_err(|_| OrchestratorError::Cycle("cycle detected during topological sort".into()))
    }

    pub fn state_of(&self, step_name: &str) -> Option<NodeState> {
        self.index_by_name
            .get(step_name)
            .map(|idx| self.graph[*idx].state)
    }

    pub fn set_state(&mut self, step_name: &str, next: NodeState) -> Result<()> {
        let idx = *self
            .index_by_name
            .get(step_name)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_name.to_string()))?;
        let current = self.graph[idx].state;
        if !current.can_transition_to(next) {
            return Err(OrchestratorError::Contract(format!(
                "illegal transition for step '{}': {:?} -> {:?}",
                step_name, current, next
            )));
        }
        self.graph[idx].state = next;
        Ok(())
    }

    /// Marks `step_name` and every transitive dependent as `Failed`,
    /// since a failed dependency makes them unreachable.
    pub fn propagate_failure(&mut self, step_name: &str) -> Result<Vec<String>> {
        let start = *self
            .index_by_name
            .get(step_name)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_name.to_string()))?;

        let mut failed = Vec::new();
        let mut stack = vec![start];
        let mut visited = std::collections::HashSet::new();

        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            let node = &mut self.graph[idx];
            if !node.state.is_terminal() {
                node.state = NodeState::Failed;
            } else if node.state != NodeState::Failed {
                continue;
            }
            failed.push(self.graph[idx].step_name.clone());
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                stack.push(dependent);
            }
        }
        Ok(failed)
    }

    /// Whether every dependency of `step_name` has succeeded.
    pub fn dependencies_satisfied(&self, step_name: &str) -> bool {
        let Some(&idx) = self.index_by_name.get(step_name) else {
            return false;
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .all(|dep_idx| self.graph[dep_idx].state == NodeState::Succeeded)
    }

    /// Whether any dependency of `step_name` has failed.
    pub fn any_dependency_failed(&self, step_name: &str) -> bool {
        let Some(&idx) = self.index_by_name.get(step_name) else {
            return false;
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .any(|dep_idx| self.graph[dep_idx].state == NodeState::Failed)
    }

    /// Longest path by cumulative duration through the DAG, via Kahn's
    /// topological order plus a dynamic-programming pass.
    pub fn critical_path(&self, durations: &HashMap<String, Duration>) -> Result<(Vec<String>, Duration)> {
        let order = self.topo_order()?;
        let mut best: HashMap<&str, Duration> = HashMap::new();
        let mut predecessor: HashMap<&str, &str> = HashMap::new();

        for name in &order {
            let idx = self.index_by_name[name];
            let own = durations.get(name).copied().unwrap_or_default();
            let mut best_here = own;
            let mut best_pred = None;
            for dep_idx in self.graph.neighbors_directed(idx, Direction::Incoming) {
                let dep_name = self.graph[dep_idx].step_name.as_str();
                let candidate = best.get(dep_name).copied().unwrap_or_default() + own;
                if candidate > best_here {
                    best_here = candidate;
                    best_pred = Some(dep_name);
                }
            }
            best.insert(name.as_str(), best_here);
            if let Some(pred) = best_pred {
                predecessor.insert(name.as_str(), pred);
            }
        }

        let Some((end, total)) = best.iter().max_by_key(|(_, d)| **d).map(|(k, v)| (*k, *v)) else {
            return Ok((Vec::new(), Duration::default()));
        };

        let mut path = vec![end.to_string()];
        let mut cursor = end;
        while let Some(pred) = predecessor.get(cursor) {
            path.push(pred.to_string());
            cursor = pred;
        }
        path.reverse();
        Ok((path, total))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Step;
    use indexmap::IndexMap;

    fn step(name: &str, depends_on: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            step_type: "bash".to_string(),
            config: serde_json::Value::Null,
            env: IndexMap::new(),
            set_variables: IndexMap::new(),
            outputs: Vec::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            when: None,
            if_: None,
            unless: None,
            continue_on_failure: false,
            timeout_seconds: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps,
        }
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let wf = workflow(vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let dag = ExecutionDag::from_workflow(&wf).unwrap();
        assert_eq!(dag.topo_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_dependency_is_rejected_at_build_time() {
        let wf = workflow(vec![step("a", &["ghost"])]);
        assert!(ExecutionDag::from_workflow(&wf).is_err());
    }

    #[test]
    fn failure_propagates_to_all_dependents() {
        let wf = workflow(vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let mut dag = ExecutionDag::from_workflow(&wf).unwrap();
        let failed = dag.propagate_failure("a").unwrap();
        assert_eq!(failed.len(), 3);
        assert_eq!(dag.state_of("c"), Some(NodeState::Failed));
    }

    #[test]
    fn dependencies_satisfied_requires_all_parents_succeeded() {
        let wf = workflow(vec![step("a", &[]), step("b", &[]), step("c", &["a", "b"])]);
        let mut dag = ExecutionDag::from_workflow(&wf).unwrap();
        assert!(!dag.dependencies_satisfied("c"));
        dag.set_state("a", NodeState::Running).unwrap();
        dag.set_state("a", NodeState::Succeeded).unwrap();
        assert!(!dag.dependencies_satisfied("c"));
        dag.set_state("b", NodeState::Running).unwrap();
        dag.set_state("b", NodeState::Succeeded).unwrap();
        assert!(dag.dependencies_satisfied("c"));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let wf = workflow(vec![step("a", &[])]);
        let mut dag = ExecutionDag::from_workflow(&wf).unwrap();
        assert!(dag.set_state("a", NodeState::Succeeded).is_err());
    }

    #[test]
    fn critical_path_picks_longest_cumulative_chain() {
        let wf = workflow(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        let dag = ExecutionDag::from_workflow(&wf).unwrap();
        let mut durations = HashMap::new();
        durations.insert("a".to_string(), Duration::from_secs(1));
        durations.insert("b".to_string(), Duration::from_secs(10));
        durations.insert("c".to_string(), Duration::from_secs(1));
        durations.insert("d".to_string(), Duration::from_secs(1));

        let (path, total) = dag.critical_path(&durations).unwrap();
        assert_eq!(path, vec!["a", "b", "d"]);
        assert_eq!(total, Duration::from_secs(12));
    }
}
