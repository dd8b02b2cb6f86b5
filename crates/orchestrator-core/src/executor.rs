// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Workflow execution engine.
//!
//! Steps run strictly in declared order — `dependsOn` can only
//! strengthen that order (by forcing a wait), never parallelise or
//! reorder it. See SPEC_FULL.md §4.E.

use crate::context::ExecutionContext;
use crate::dag::{ExecutionDag, NodeState};
use crate::error::{OrchestratorError, Result};
use crate::graph::{step_node_id, ExecutionGraph};
use crate::provisioner::{CancellationToken, ProvisionerRegistry, Resource};
use crate::variables::{self, ResolutionMode};
use crate::workflow::{Step, Workflow};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub state: NodeState,
    pub skipped: bool,
    pub outputs: HashMap<String, String>,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub duration: Duration,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Drives one workflow run to completion against a provisioner
/// registry, mirroring every step-state transition into an
/// [`ExecutionGraph`] for observer fan-out.
pub struct WorkflowExecutor<'a> {
    workflow: Workflow,
    provisioners: &'a ProvisionerRegistry,
    resolution_mode: ResolutionMode,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(workflow: Workflow, provisioners: &'a ProvisionerRegistry) -> Result<Self> {
        workflow.validate()?;
        Ok(Self {
            workflow,
            provisioners,
            resolution_mode: ResolutionMode::Strict,
        })
    }

    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.resolution_mode = mode;
        self
    }

    /// Runs every step in declared order, stopping at the first
    /// unrecovered failure (a failed step without `continueOnFailure`).
    pub async fn execute(&self, graph: &mut ExecutionGraph) -> Result<HashMap<String, StepResult>> {
        info!(workflow = %self.workflow.name, steps = self.workflow.steps.len(), "starting workflow execution");

        let mut dag = ExecutionDag::from_workflow(&self.workflow)?;
        let mut context = ExecutionContext::new();
        context.seed_workflow_variables(&self.workflow.variables)?;

        if let Err((step_name, err)) = self.validate_workflow_references(&context) {
            warn!(step = %step_name, error = %err, "workflow pre-validation failed, no provisioner dispatched");
            dag.set_state(&step_name, NodeState::Failed).ok();
            self.sync_graph_state(
                graph,
                &step_name,
                NodeState::Failed,
                Some(serde_json::json!({"error": err.to_string()})),
            )
            .ok();
            return Err(err);
        }

        let mut results = HashMap::new();
        let cancellation = CancellationToken::new();

        for step in &self.workflow.steps {
            if dag.any_dependency_failed(&step.name) && !step.continue_on_failure {
                let failed = dag.propagate_failure(&step.name)?;
                for name in &failed {
                    self.sync_graph_state(graph, name, NodeState::Failed, None)?;
                }
                warn!(step = %step.name, "upstream dependency failed, stopping workflow");
                results.insert(
                    step.name.clone(),
                    StepResult {
                        step_name: step.name.clone(),
                        state: NodeState::Failed,
                        skipped: false,
                        outputs: HashMap::new(),
                        error: Some("upstream dependency failed".to_string()),
                        duration: Duration::default(),
                    },
                );
                break;
            }

            let env = self.resolve_step_env(step, &context)?;

            if let Some((expr, negate)) = step.predicate() {
                if !context.evaluate_predicate(expr, negate, &env)? {
                    debug!(step = %step.name, "predicate false, skipping step");
                    dag.set_state(&step.name, NodeState::Waiting)?;
                    self.sync_graph_state(graph, &step.name, NodeState::Waiting, None)?;
                    dag.set_state(&step.name, NodeState::Running)?;
                    self.sync_graph_state(graph, &step.name, NodeState::Running, None)?;
                    dag.set_state(&step.name, NodeState::Succeeded)?;
                    self.sync_graph_state(
                        graph,
                        &step.name,
                        NodeState::Succeeded,
                        Some(serde_json::json!({"skipped": true})),
                    )?;
                    results.insert(
                        step.name.clone(),
                        StepResult {
                            step_name: step.name.clone(),
                            state: NodeState::Succeeded,
                            skipped: true,
                            outputs: HashMap::new(),
                            error: None,
                            duration: Duration::default(),
                        },
                    );
                    continue;
                }
            }

            let result = self
                .execute_step(step, &mut context, &env, &mut dag, graph, &cancellation)
                .await;

            let stop = matches!(result.state, NodeState::Failed) && !step.continue_on_failure;
            results.insert(step.name.clone(), result);
            if stop {
                warn!(step = %step.name, "step failed, stopping workflow");
                break;
            }
        }

        Ok(results)
    }

    /// §4.G's workflow-load-time check: every `workflow.*` reference
    /// across every step's config/env/setVariables/outputs/dependsOn/
    /// predicate must resolve before step 1 dispatches, so a bad
    /// reference in a later step is caught before an earlier step's
    /// provisioner ever runs. Other reference kinds (step outputs,
    /// resources, process env) are only known once steps have run and
    /// are left to interpolation time. Returns the offending step's name
    /// alongside the error so the caller can sync that step's graph
    /// node to `failed`.
    fn validate_workflow_references(
        &self,
        context: &ExecutionContext,
    ) -> std::result::Result<(), (String, OrchestratorError)> {
        for step in &self.workflow.steps {
            for var_ref in variables::collect_step_refs(step) {
                let Some(key) = var_ref.name.strip_prefix("workflow.") else {
                    continue;
                };
                if context.workflow_vars.contains_key(key) {
                    continue;
                }
                match self.resolution_mode {
                    ResolutionMode::Strict => {
                        return Err((step.name.clone(), OrchestratorError::UndefinedVariable(var_ref.full_match)));
                    }
                    ResolutionMode::Lenient => {
                        warn!(step = %step.name, reference = %var_ref.full_match, "undefined workflow variable referenced");
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_step_env(&self, step: &Step, context: &ExecutionContext) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();
        for (key, raw) in &step.env {
            let value = context.interpolate_str(raw, &resolved, self.resolution_mode)?;
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    async fn execute_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        env: &HashMap<String, String>,
        dag: &mut ExecutionDag,
        graph: &mut ExecutionGraph,
        cancellation: &CancellationToken,
    ) -> StepResult {
        let start = Instant::now();
        info!(step = %step.name, step_type = %step.step_type, "executing step");

        dag.set_state(&step.name, NodeState::Waiting).ok();
        self.sync_graph_state(graph, &step.name, NodeState::Waiting, None).ok();
        dag.set_state(&step.name, NodeState::Running).ok();
        self.sync_graph_state(graph, &step.name, NodeState::Running, None).ok();

        let outcome = self.run_provisioner(step, context, env, cancellation).await;
        let duration = start.elapsed();

        match outcome {
            Ok((outputs, resource_attrs)) => {
                context.record_step_outputs(&step.name, outputs.clone());
                context.record_resource(&step.name, resource_attrs);

                dag.set_state(&step.name, NodeState::Succeeded).ok();
                self.sync_graph_state(graph, &step.name, NodeState::Succeeded, None).ok();

                info!(step = %step.name, duration_ms = duration.as_millis(), "step succeeded");
                StepResult {
                    step_name: step.name.clone(),
                    state: NodeState::Succeeded,
                    skipped: false,
                    outputs,
                    error: None,
                    duration,
                }
            }
            Err(err) => {
                dag.set_state(&step.name, NodeState::Failed).ok();
                self.sync_graph_state(graph, &step.name, NodeState::Failed, None).ok();

                warn!(step = %step.name, error = %err, "step failed");
                StepResult {
                    step_name: step.name.clone(),
                    state: NodeState::Failed,
                    skipped: false,
                    outputs: HashMap::new(),
                    error: Some(err.to_string()),
                    duration,
                }
            }
        }
    }

    async fn run_provisioner(
        &self,
        step: &Step,
        context: &ExecutionContext,
        env: &HashMap<String, String>,
        cancellation: &CancellationToken,
    ) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
        let provisioner = self.provisioners.get(&step.step_type)?;
        let config = context.interpolate_config(&step.config, env, self.resolution_mode)?;
        provisioner.validate_config(&config)?;

        let mut resource = Resource::new(step.name.clone());
        let run = provisioner.provision(&mut resource, &config, cancellation);
        match step.timeout_seconds {
            Some(secs) => timeout(Duration::from_secs(secs), run)
                .await
                .map_err(|_| OrchestratorError::Timeout(step.name.clone(), Duration::from_secs(secs)))??,
            None => run.await?,
        };

        let resource_attrs = resource.flatten_properties();
        let outputs: HashMap<String, String> = step
            .outputs
            .iter()
            .filter_map(|name| resource_attrs.get(name).cloned().map(|v| (name.clone(), v)))
            .collect();

        Ok((outputs, resource_attrs))
    }

    fn sync_graph_state(
        &self,
        graph: &mut ExecutionGraph,
        step_name: &str,
        state: NodeState,
        properties: Option<serde_json::Value>,
    ) -> Result<()> {
        graph.set_node_state(&step_node_id(step_name), state, properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::{Provisioner, ProvisionState};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn step(name: &str, step_type: &str, depends_on: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            step_type: step_type.to_string(),
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

    struct AlwaysSucceeds;
    #[async_trait]
    impl Provisioner for AlwaysSucceeds {
        fn name(&self) -> &str {
            "no-op"
        }
        fn provisioner_type(&self) -> &str {
            "noop"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn validate_config(&self, _config: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn provision(
            &self,
            _resource: &mut Resource,
            _config: &serde_json::Value,
            _cancellation: &CancellationToken,
        ) -> Result<()> {
            Ok(())
        }
        async fn deprovision(&self, _resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
            Ok(())
        }
        async fn get_status(&self, _resource: &Resource) -> Result<ProvisionState> {
            Ok(ProvisionState::Ready)
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl Provisioner for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        fn provisioner_type(&self) -> &str {
            "failing"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn validate_config(&self, _config: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn provision(
            &self,
            _resource: &mut Resource,
            _config: &serde_json::Value,
            _cancellation: &CancellationToken,
        ) -> Result<()> {
            Err(OrchestratorError::FatalStep("always fails".to_string()))
        }
        async fn deprovision(&self, _resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
            Ok(())
        }
        async fn get_status(&self, _resource: &Resource) -> Result<ProvisionState> {
            Ok(ProvisionState::Failed)
        }
    }

    #[tokio::test]
    async fn sequential_steps_all_succeed() {
        let registry = ProvisionerRegistry::new();
        registry.register(Arc::new(AlwaysSucceeds)).unwrap();

        let workflow = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", "noop", &[]), step("b", "noop", &["a"])],
        };

        let mut graph = ExecutionGraph::from_workflow("demo", &workflow);
        let executor = WorkflowExecutor::new(workflow, &registry).unwrap();
        let results = executor.execute(&mut graph).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["a"].state, NodeState::Succeeded);
        assert_eq!(results["b"].state, NodeState::Succeeded);
        assert_eq!(
            graph.node_state(&crate::graph::workflow_node_id()),
            Some(NodeState::Succeeded)
        );
        assert_eq!(
            graph.node_state(&crate::graph::spec_node_id()),
            Some(NodeState::Succeeded)
        );
    }

    #[tokio::test]
    async fn failure_without_continue_stops_the_workflow() {
        let registry = ProvisionerRegistry::new();
        registry.register(Arc::new(AlwaysFails)).unwrap();
        registry.register(Arc::new(AlwaysSucceeds)).unwrap();

        let workflow = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", "failing", &[]), step("b", "noop", &["a"])],
        };

        let mut graph = ExecutionGraph::from_workflow("demo", &workflow);
        let executor = WorkflowExecutor::new(workflow, &registry).unwrap();
        let results = executor.execute(&mut graph).await.unwrap();

        assert_eq!(results["a"].state, NodeState::Failed);
        assert!(!results.contains_key("b"));
        assert_eq!(
            graph.node_state(&crate::graph::workflow_node_id()),
            Some(NodeState::Failed)
        );
        assert_eq!(
            graph.node_state(&crate::graph::spec_node_id()),
            Some(NodeState::Failed)
        );
    }

    #[tokio::test]
    async fn continue_on_failure_runs_the_next_step_anyway() {
        let registry = ProvisionerRegistry::new();
        registry.register(Arc::new(AlwaysFails)).unwrap();
        registry.register(Arc::new(AlwaysSucceeds)).unwrap();

        let mut first = step("a", "failing", &[]);
        first.continue_on_failure = true;
        let workflow = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![first, step("b", "noop", &["a"])],
        };

        let mut graph = ExecutionGraph::from_workflow("demo", &workflow);
        let executor = WorkflowExecutor::new(workflow, &registry).unwrap();
        let results = executor.execute(&mut graph).await.unwrap();

        assert_eq!(results["a"].state, NodeState::Failed);
        assert_eq!(results["b"].state, NodeState::Succeeded);
    }

    #[tokio::test]
    async fn undefined_workflow_reference_fails_before_any_provisioner_runs() {
        struct PanicsIfCalled;
        #[async_trait]
        impl Provisioner for PanicsIfCalled {
            fn name(&self) -> &str {
                "panics-if-called"
            }
            fn provisioner_type(&self) -> &str {
                "noop"
            }
            fn version(&self) -> &str {
                "1.0.0"
            }
            fn validate_config(&self, _config: &serde_json::Value) -> Result<()> {
                Ok(())
            }
            async fn provision(
                &self,
                _resource: &mut Resource,
                _config: &serde_json::Value,
                _cancellation: &CancellationToken,
            ) -> Result<()> {
                panic!("provisioner must not run when pre-validation fails");
            }
            async fn deprovision(&self, _resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
                Ok(())
            }
            async fn get_status(&self, _resource: &Resource) -> Result<ProvisionState> {
                Ok(ProvisionState::Ready)
            }
        }

        let registry = ProvisionerRegistry::new();
        registry.register(Arc::new(PanicsIfCalled)).unwrap();

        let mut bad_step = step("a", "noop", &[]);
        bad_step.config = serde_json::json!({"image": "${workflow.missing}"});
        let workflow = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![bad_step],
        };

        let mut graph = ExecutionGraph::from_workflow("demo", &workflow);
        let executor = WorkflowExecutor::new(workflow, &registry).unwrap();
        let err = executor.execute(&mut graph).await.unwrap_err();

        assert_eq!(err.to_string(), "undefined variable: ${workflow.missing}");
        assert_eq!(
            graph.node_state(&step_node_id("a")),
            Some(NodeState::Failed)
        );
        assert_eq!(
            graph.node_state(&crate::graph::workflow_node_id()),
            Some(NodeState::Failed)
        );
        assert_eq!(
            graph.node_state(&crate::graph::spec_node_id()),
            Some(NodeState::Failed)
        );
    }

    #[tokio::test]
    async fn unless_false_predicate_skips_step() {
        let registry = ProvisionerRegistry::new();
        registry.register(Arc::new(AlwaysSucceeds)).unwrap();

        let mut only_step = step("a", "noop", &[]);
        only_step.unless = Some("true".to_string());
        let workflow = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![only_step],
        };

        let mut graph = ExecutionGraph::from_workflow("demo", &workflow);
        let executor = WorkflowExecutor::new(workflow, &registry).unwrap();
        let results = executor.execute(&mut graph).await.unwrap();

        assert!(results["a"].skipped);
        assert_eq!(results["a"].state, NodeState::Succeeded);
    }
}
