// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Execution-graph model: the in-memory DAG of spec/workflow/step/
//! resource nodes that a worker materialises for one running
//! application, with state propagation, observer fan-out, critical-path
//! analysis, layout, and export. See SPEC_FULL.md §4.D.

use crate::dag::NodeState;
use crate::observer::{GraphEvent, GraphObserver, NodeType, ObserverBus};
use crate::workflow::Workflow;
use chrono::Utc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// spec → workflow, workflow → step
    Contains,
    /// step → resource
    Configures,
    /// step → dependent step
    DependsOn,
}

#[derive(Debug, Clone)]
struct NodeData {
    id: String,
    node_type: NodeType,
    state: NodeState,
    properties: serde_json::Map<String, serde_json::Value>,
}

/// The materialised graph for one application's run. `app_name`
/// identifies it for observer events and export.
pub struct ExecutionGraph {
    app_name: String,
    graph: DiGraph<NodeData, EdgeKind>,
    index_by_id: HashMap<String, NodeIndex>,
    bus: ObserverBus,
}

pub fn spec_node_id() -> String {
    "spec".to_string()
}

pub fn workflow_node_id() -> String {
    "workflow".to_string()
}

pub fn step_node_id(step_name: &str) -> String {
    format!("step:{step_name}")
}

pub fn resource_node_id(step_name: &str) -> String {
    format!("resource:{step_name}")
}

impl ExecutionGraph {
    /// Builds the full graph for `workflow`: one spec node, one workflow
    /// node, one step node per declared step, one resource node per
    /// step (each step implicitly configures exactly one resource named
    /// after itself), `contains`/`configures` edges, and `dependsOn`
    /// edges mirroring the workflow's step ordering.
    pub fn from_workflow(app_name: impl Into<String>, workflow: &Workflow) -> Self {
        let mut g = ExecutionGraph {
            app_name: app_name.into(),
            graph: DiGraph::new(),
            index_by_id: HashMap::new(),
            bus: ObserverBus::new(),
        };

        let spec_idx = g.add_node(spec_node_id(), NodeType::Spec);
        let workflow_idx = g.add_node(workflow_node_id(), NodeType::Workflow);
        g.graph.add_edge(spec_idx, workflow_idx, EdgeKind::Contains);

        let mut step_indices = HashMap::new();
        for step in &workflow.steps {
            let step_idx = g.add_node(step_node_id(&step.name), NodeType::Step);
            g.graph.add_edge(workflow_idx, step_idx, EdgeKind::Contains);

            let resource_idx = g.add_node(resource_node_id(&step.name), NodeType::Resource);
            g.graph.add_edge(step_idx, resource_idx, EdgeKind::Configures);

            step_indices.insert(step.name.clone(), step_idx);
        }

        for step in &workflow.steps {
            let dependent_idx = step_indices[&step.name];
            for dep in &step.depends_on {
                if let Some(&dep_idx) = step_indices.get(dep) {
                    g.graph.add_edge(dep_idx, dependent_idx, EdgeKind::DependsOn);
                }
            }
        }

        g
    }

    fn add_node(&mut self, id: String, node_type: NodeType) -> NodeIndex {
        let idx = self.graph.add_node(NodeData {
            id: id.clone(),
            node_type,
            state: NodeState::Pending,
            properties: serde_json::Map::new(),
        });
        self.index_by_id.insert(id, idx);
        idx
    }

    pub fn subscribe(&self, observer: Arc<dyn GraphObserver>) {
        self.bus.subscribe(observer);
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.index_by_id.get(node_id).map(|&idx| self.graph[idx].state)
    }

    /// Transitions a node's state, validating against the shared state
    /// machine, then fires `OnNodeStateChanged` to every subscriber, then
    /// rolls the transition up to the node's `contains` parent (and its
    /// parent, and so on) per SPEC_FULL.md §4.D's state-propagation
    /// rules. The lock scope (index lookup + mutation) ends before the
    /// bus runs, so no lock is held during observer fan-out.
    pub fn set_node_state(
        &mut self,
        node_id: &str,
        new_state: NodeState,
        properties: Option<serde_json::Value>,
    ) -> crate::error::Result<()> {
        let idx = *self.index_by_id.get(node_id).ok_or_else(|| {
            crate::error::OrchestratorError::StepNotFound(node_id.to_string())
        })?;
        self.transition(idx, new_state, properties)?;
        self.propagate_to_parent(idx)
    }

    /// The validated mutate-and-notify step, with no propagation. Used
    /// both for a caller-named node (`set_node_state`) and internally
    /// for the parent nodes propagation drives into their next state.
    fn transition(
        &mut self,
        idx: NodeIndex,
        new_state: NodeState,
        properties: Option<serde_json::Value>,
    ) -> crate::error::Result<()> {
        let old_state = self.graph[idx].state;
        if !old_state.can_transition_to(new_state) {
            return Err(crate::error::OrchestratorError::Contract(format!(
                "illegal transition for node '{}': {:?} -> {:?}",
                self.graph[idx].id, old_state, new_state
            )));
        }

        let node_type = self.graph[idx].node_type;
        let node_id = self.graph[idx].id.clone();
        self.graph[idx].state = new_state;

        self.bus.emit(GraphEvent::NodeStateChanged {
            app_name: self.app_name.clone(),
            node_id,
            node_type,
            old_state: Some(old_state),
            new_state,
            timestamp: Utc::now(),
            properties,
        });
        Ok(())
    }

    /// The node's `contains` parent, if any (a step's workflow, or a
    /// workflow's spec).
    fn parent_via_contains(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .find(|e| *e.weight() == EdgeKind::Contains)
            .map(|e| e.source())
    }

    /// Rolls `idx`'s new state up to its `contains` parent, per
    /// SPEC_FULL.md §4.D:
    /// 1. any step → `failed` forces its parent → `failed` (idempotent:
    ///    skipped once the parent is already terminal);
    /// 2. when every `contains` child of a node has `succeeded`, the
    ///    node itself → `succeeded`;
    /// 3. a node leaving `pending` (entering `waiting`/`running`) pulls
    ///    a still-`pending` parent into `running`, so the chain
    ///    `pending → running → succeeded|failed` stays legal all the
    ///    way up to the spec node.
    /// Recurses so a step failure/success reaches the workflow and then
    /// the spec node in one call.
    fn propagate_to_parent(&mut self, idx: NodeIndex) -> crate::error::Result<()> {
        let Some(parent_idx) = self.parent_via_contains(idx) else {
            return Ok(());
        };
        let state = self.graph[idx].state;
        let parent_state = self.graph[parent_idx].state;

        match state {
            NodeState::Failed => {
                if !parent_state.is_terminal() {
                    self.transition(parent_idx, NodeState::Failed, None)?;
                    self.propagate_to_parent(parent_idx)?;
                }
            }
            NodeState::Waiting | NodeState::Running => {
                if parent_state == NodeState::Pending {
                    self.transition(parent_idx, NodeState::Running, None)?;
                    self.propagate_to_parent(parent_idx)?;
                }
            }
            NodeState::Succeeded => {
                let all_children_succeeded = self
                    .graph
                    .edges_directed(parent_idx, Direction::Outgoing)
                    .filter(|e| *e.weight() == EdgeKind::Contains)
                    .all(|e| self.graph[e.target()].state == NodeState::Succeeded);
                if all_children_succeeded && parent_state == NodeState::Running {
                    self.transition(parent_idx, NodeState::Succeeded, None)?;
                    self.propagate_to_parent(parent_idx)?;
                }
            }
            NodeState::Pending => {}
        }
        Ok(())
    }

    pub fn update_node_properties(&mut self, node_id: &str, properties: serde_json::Value) -> crate::error::Result<()> {
        let idx = *self.index_by_id.get(node_id).ok_or_else(|| {
            crate::error::OrchestratorError::StepNotFound(node_id.to_string())
        })?;
        if let serde_json::Value::Object(map) = &properties {
            self.graph[idx].properties.extend(map.clone());
        }
        self.bus.emit(GraphEvent::NodeUpdated {
            app_name: self.app_name.clone(),
            node_id: node_id.to_string(),
            properties,
        });
        Ok(())
    }

    pub fn notify_graph_updated(&self) {
        self.bus.emit(GraphEvent::GraphUpdated {
            app_name: self.app_name.clone(),
        });
    }

    /// Longest weighted path through step nodes only, following
    /// `dependsOn` edges, via Kahn's topological order plus DP. Cycles
    /// (which should never occur — the workflow validator rejects them
    /// upstream) are handled defensively by treating any back-edge
    /// discovered mid-traversal as absent.
    pub fn critical_path(&self, durations: &HashMap<String, Duration>) -> (Vec<String>, Duration) {
        let step_indices: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].node_type == NodeType::Step)
            .collect();

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &step_indices {
            let degree = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|&dep| {
                    self.graph
                        .find_edge(dep, idx)
                        .map(|e| self.graph[e] == EdgeKind::DependsOn)
                        .unwrap_or(false)
                })
                .count();
            in_degree.insert(idx, degree);
        }

        let mut queue: Vec<NodeIndex> = step_indices
            .iter()
            .copied()
            .filter(|idx| in_degree[idx] == 0)
            .collect();
        let mut order = Vec::new();
        let mut remaining = in_degree.clone();

        while let Some(idx) = queue.pop() {
            order.push(idx);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if self.graph[next].node_type != NodeType::Step {
                    continue;
                }
                if self.graph.find_edge(idx, next).map(|e| self.graph[e]) != Some(EdgeKind::DependsOn) {
                    continue;
                }
                if let Some(deg) = remaining.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(next);
                    }
                }
            }
        }

        let mut best: HashMap<NodeIndex, Duration> = HashMap::new();
        let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        for &idx in &order {
            let name = self.step_name(idx);
            let own = durations.get(&name).copied().unwrap_or_default();
            let mut best_here = own;
            let mut best_pred = None;
            for dep in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if self.graph.find_edge(dep, idx).map(|e| self.graph[e]) != Some(EdgeKind::DependsOn) {
                    continue;
                }
                let candidate = best.get(&dep).copied().unwrap_or_default() + own;
                if candidate > best_here {
                    best_here = candidate;
                    best_pred = Some(dep);
                }
            }
            best.insert(idx, best_here);
            if let Some(pred) = best_pred {
                predecessor.insert(idx, pred);
            }
        }

        let Some((&end, &total)) = best.iter().max_by_key(|(_, d)| **d) else {
            return (Vec::new(), Duration::default());
        };

        let mut path = vec![self.step_name(end)];
        let mut cursor = end;
        while let Some(&pred) = predecessor.get(&cursor) {
            path.push(self.step_name(pred));
            cursor = pred;
        }
        path.reverse();
        (path, total)
    }

    fn step_name(&self, idx: NodeIndex) -> String {
        self.graph[idx].id.trim_start_matches("step:").to_string()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.graph.node_indices().map(|idx| self.graph[idx].id.clone()).collect()
    }

    /// `(from, to)` pairs for every edge, in insertion order.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_indices()
            .map(|e| {
                let (from, to) = self.graph.edge_endpoints(e).unwrap();
                (self.graph[from].id.clone(), self.graph[to].id.clone())
            })
            .collect()
    }

    /// BFS depth of each node from the spec root, for layered layouts.
    pub fn levels(&self) -> HashMap<String, usize> {
        let root = self.index_by_id[&spec_node_id()];
        let mut levels = HashMap::new();
        levels.insert(self.graph[root].id.clone(), 0usize);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(root);
        while let Some(idx) = queue.pop_front() {
            let depth = levels[&self.graph[idx].id];
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let id = self.graph[next].id.clone();
                if !levels.contains_key(&id) {
                    levels.insert(id, depth + 1);
                    queue.push_back(next);
                }
            }
        }
        levels
    }

    /// Serialises the graph to the requested format. `svg`/`png` are
    /// intentionally unsupported here: rendering raster/vector images
    /// is the external renderer's job, not the core's — see DESIGN.md.
    pub fn export(&self, format: &str) -> crate::error::Result<String> {
        match format {
            "json" => self.export_json(),
            "dot" => Ok(self.export_dot()),
            "mermaid-flowchart" => Ok(self.export_mermaid_flowchart()),
            "mermaid-state" => Ok(self.export_mermaid_state()),
            "mermaid-gantt" => Ok(self.export_mermaid_gantt()),
            "svg" | "png" => Err(crate::error::OrchestratorError::Configuration(format!(
                "format '{format}' requires an external renderer; export 'dot' or 'mermaid-flowchart' and pipe it through one"
            ))),
            other => Err(crate::error::OrchestratorError::Configuration(format!(
                "unknown export format '{other}'"
            ))),
        }
    }

    fn export_json(&self) -> crate::error::Result<String> {
        #[derive(serde::Serialize)]
        struct ExportNode {
            id: String,
            node_type: NodeType,
            state: NodeState,
            properties: serde_json::Map<String, serde_json::Value>,
        }
        #[derive(serde::Serialize)]
        struct ExportEdge {
            from: String,
            to: String,
            kind: &'static str,
        }
        #[derive(serde::Serialize)]
        struct ExportGraph {
            app_name: String,
            nodes: Vec<ExportNode>,
            edges: Vec<ExportEdge>,
        }

        let nodes: Vec<ExportNode> = self
            .graph
            .node_indices()
            .map(|idx| {
                let n = &self.graph[idx];
                ExportNode {
                    id: n.id.clone(),
                    node_type: n.node_type,
                    state: n.state,
                    properties: n.properties.clone(),
                }
            })
            .collect();

        let edges: Vec<ExportEdge> = self
            .graph
            .edge_indices()
            .map(|e| {
                let (from_idx, to_idx) = self.graph.edge_endpoints(e).unwrap();
                ExportEdge {
                    from: self.graph[from_idx].id.clone(),
                    to: self.graph[to_idx].id.clone(),
                    kind: match self.graph[e] {
                        EdgeKind::Contains => "contains",
                        EdgeKind::Configures => "configures",
                        EdgeKind::DependsOn => "dependsOn",
                    },
                }
            })
            .collect();

        let export = ExportGraph {
            app_name: self.app_name.clone(),
            nodes,
            edges,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    fn export_dot(&self) -> String {
        let mut out = format!("digraph \"{}\" {{\n", self.app_name);
        for idx in self.graph.node_indices() {
            let n = &self.graph[idx];
            let _ = writeln!(out, "  \"{}\" [label=\"{} ({:?})\"];", n.id, n.id, n.state);
        }
        for e in self.graph.edge_indices() {
            let (from, to) = self.graph.edge_endpoints(e).unwrap();
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\";",
                self.graph[from].id, self.graph[to].id
            );
        }
        out.push_str("}\n");
        out
    }

    fn export_mermaid_flowchart(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for idx in self.graph.node_indices() {
            let n = &self.graph[idx];
            let id = mermaid_id(&n.id);
            let _ = writeln!(out, "  {id}[\"{}\"]", n.id);
        }
        for e in self.graph.edge_indices() {
            let (from, to) = self.graph.edge_endpoints(e).unwrap();
            let _ = writeln!(
                out,
                "  {} --> {}",
                mermaid_id(&self.graph[from].id),
                mermaid_id(&self.graph[to].id)
            );
        }
        out
    }

    fn export_mermaid_state(&self) -> String {
        let mut out = String::from("stateDiagram-v2\n");
        for idx in self.graph.node_indices() {
            let n = &self.graph[idx];
            let _ = writeln!(out, "  {}: {:?}", mermaid_id(&n.id), n.state);
        }
        for e in self.graph.edge_indices() {
            let (from, to) = self.graph.edge_endpoints(e).unwrap();
            let _ = writeln!(
                out,
                "  {} --> {}",
                mermaid_id(&self.graph[from].id),
                mermaid_id(&self.graph[to].id)
            );
        }
        out
    }

    fn export_mermaid_gantt(&self) -> String {
        let mut out = String::from("gantt\n  title Execution timeline\n  dateFormat X\n");
        for idx in self.graph.node_indices() {
            let n = &self.graph[idx];
            if n.node_type != NodeType::Step {
                continue;
            }
            let _ = writeln!(out, "  {} : {}, 0, 1", n.id, mermaid_id(&n.id));
        }
        out
    }
}

fn mermaid_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Process-wide `appName -> Graph` map, per SPEC_FULL.md §4.D ("In-memory
/// map of (appName -> Graph)"). Workers materialise a graph here when a
/// task starts; external callers (the CLI's `graph show`/`graph export`
/// commands, or a future HTTP surface) read it back by app name. Keyed
/// access is single-writer-per-app in practice (one worker owns a given
/// app's execution at a time) but the map itself tolerates concurrent
/// access from any number of readers and writers across apps.
#[derive(Default)]
pub struct GraphStore {
    graphs: parking_lot::RwLock<HashMap<String, ExecutionGraph>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the graph for `app_name`, returning the
    /// previous one if a run for this app had already materialised one.
    pub fn put(&self, graph: ExecutionGraph) {
        let app_name = graph.app_name().to_string();
        self.graphs.write().insert(app_name, graph);
    }

    /// Runs `f` against the stored graph for `app_name`, if any. The
    /// graph is only reachable under the store's lock, so callers that
    /// need to mutate it (e.g. `set_node_state`) must do so inside `f`
    /// rather than cloning it out.
    pub fn with_graph_mut<R>(&self, app_name: &str, f: impl FnOnce(&mut ExecutionGraph) -> R) -> Option<R> {
        self.graphs.write().get_mut(app_name).map(f)
    }

    pub fn export_graph(&self, app_name: &str, format: &str) -> crate::error::Result<String> {
        let graphs = self.graphs.read();
        let graph = graphs.get(app_name).ok_or_else(|| {
            crate::error::OrchestratorError::Configuration(format!("no graph for app '{app_name}'"))
        })?;
        graph.export(format)
    }

    pub fn node_state(&self, app_name: &str, node_id: &str) -> Option<NodeState> {
        self.graphs.read().get(app_name).and_then(|g| g.node_state(node_id))
    }

    pub fn app_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove(&self, app_name: &str) -> bool {
        self.graphs.write().remove(app_name).is_some()
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

    fn workflow() -> Workflow {
        Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", &[]), step("b", &["a"])],
        }
    }

    #[test]
    fn from_workflow_creates_expected_node_count() {
        let g = ExecutionGraph::from_workflow("demo", &workflow());
        // spec + workflow + 2 steps + 2 resources
        assert_eq!(g.node_count(), 6);
    }

    #[test]
    fn set_node_state_emits_to_subscribers() {
        let mut g = ExecutionGraph::from_workflow("demo", &workflow());

        struct Recorder(std::sync::Mutex<Vec<GraphEvent>>);
        impl GraphObserver for Recorder {
            fn on_event(&self, event: &GraphEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        g.subscribe(recorder.clone());

        g.set_node_state(&step_node_id("a"), NodeState::Running, None).unwrap();
        // The step's own transition plus the workflow/spec nodes it
        // pulls out of `pending` along the way.
        assert_eq!(recorder.0.lock().unwrap().len(), 3);
        assert_eq!(g.node_state(&step_node_id("a")), Some(NodeState::Running));
        assert_eq!(g.node_state(&workflow_node_id()), Some(NodeState::Running));
        assert_eq!(g.node_state(&spec_node_id()), Some(NodeState::Running));
    }

    #[test]
    fn step_failure_propagates_to_workflow_and_spec() {
        let mut g = ExecutionGraph::from_workflow("demo", &workflow());
        g.set_node_state(&step_node_id("a"), NodeState::Waiting, None).unwrap();
        g.set_node_state(&step_node_id("a"), NodeState::Running, None).unwrap();
        g.set_node_state(&step_node_id("a"), NodeState::Failed, None).unwrap();

        assert_eq!(g.node_state(&step_node_id("a")), Some(NodeState::Failed));
        assert_eq!(g.node_state(&workflow_node_id()), Some(NodeState::Failed));
        assert_eq!(g.node_state(&spec_node_id()), Some(NodeState::Failed));
    }

    #[test]
    fn all_steps_succeeding_propagates_workflow_and_spec_to_succeeded() {
        let mut g = ExecutionGraph::from_workflow("demo", &workflow());
        for name in ["a", "b"] {
            g.set_node_state(&step_node_id(name), NodeState::Waiting, None).unwrap();
            g.set_node_state(&step_node_id(name), NodeState::Running, None).unwrap();
            g.set_node_state(&step_node_id(name), NodeState::Succeeded, None).unwrap();
        }

        assert_eq!(g.node_state(&workflow_node_id()), Some(NodeState::Succeeded));
        assert_eq!(g.node_state(&spec_node_id()), Some(NodeState::Succeeded));
    }

    #[test]
    fn workflow_stays_running_while_a_sibling_step_is_still_pending() {
        let mut g = ExecutionGraph::from_workflow("demo", &workflow());
        g.set_node_state(&step_node_id("a"), NodeState::Waiting, None).unwrap();
        g.set_node_state(&step_node_id("a"), NodeState::Running, None).unwrap();
        g.set_node_state(&step_node_id("a"), NodeState::Succeeded, None).unwrap();

        // "b" hasn't run yet, so the workflow can't be succeeded.
        assert_eq!(g.node_state(&workflow_node_id()), Some(NodeState::Running));
    }

    #[test]
    fn illegal_transition_does_not_notify() {
        let mut g = ExecutionGraph::from_workflow("demo", &workflow());
        let result = g.set_node_state(&step_node_id("a"), NodeState::Succeeded, None);
        assert!(result.is_err());
    }

    #[test]
    fn critical_path_over_step_nodes_only() {
        let g = ExecutionGraph::from_workflow("demo", &workflow());
        let mut durations = HashMap::new();
        durations.insert("a".to_string(), Duration::from_secs(2));
        durations.insert("b".to_string(), Duration::from_secs(3));
        let (path, total) = g.critical_path(&durations);
        assert_eq!(path, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(total, Duration::from_secs(5));
    }

    #[test]
    fn json_export_includes_contains_and_configures_edges() {
        let g = ExecutionGraph::from_workflow("demo", &workflow());
        let json = g.export("json").unwrap();
        assert!(json.contains("\"contains\""));
        assert!(json.contains("\"configures\""));
    }

    #[test]
    fn svg_export_is_rejected_with_a_helpful_message() {
        let g = ExecutionGraph::from_workflow("demo", &workflow());
        let err = g.export("svg").unwrap_err();
        assert!(err.to_string().contains("external renderer"));
    }
}
