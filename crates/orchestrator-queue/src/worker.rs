// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! The worker pool: claims tasks, resolves them into a [`Workflow`],
//! drives a [`WorkflowExecutor`] against the shared provisioner
//! registry, and reports the outcome back to the queue. See
//! SPEC_FULL.md §4.F and §6 ("`SpecSource`").

use crate::error::Result;
use crate::store::{TaskOutcome, TaskQueue};
use crate::task::QueueTask;
use orchestrator_core::error::OrchestratorError;
use orchestrator_core::executor::WorkflowExecutor;
use orchestrator_core::golden_path::GoldenPathRegistry;
use orchestrator_core::graph::{ExecutionGraph, GraphStore};
use orchestrator_core::params;
use orchestrator_core::platform::PlatformRegistry;
use orchestrator_core::workflow::{Workflow, WorkflowFile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Prefix of `OrchestratorError::FatalStep`'s `Display` output — the
/// one signal a provisioner has for "do not retry this task", since
/// `StepResult::error` only carries the formatted string, not the
/// original error variant.
const FATAL_STEP_PREFIX: &str = "fatal step error:";

/// Resolves a claimed [`QueueTask`] into a runnable [`Workflow`].
///
/// A task whose `workflow_name` matches a registered golden path is
/// loaded from that path's workflow file, with `workflow_payload`
/// interpreted as `{"params": {...}}` user parameters merged against
/// the golden path's typed schema. Any other task's `workflow_payload`
/// is the inline workflow document itself.
pub struct WorkflowResolver {
    golden_paths: Option<GoldenPathRegistry>,
    base_dir: PathBuf,
}

impl WorkflowResolver {
    pub fn new(golden_paths: Option<GoldenPathRegistry>, base_dir: impl Into<PathBuf>) -> Self {
        Self { golden_paths, base_dir: base_dir.into() }
    }

    pub fn resolve(&self, task: &QueueTask) -> Result<Workflow> {
        if let Some(registry) = &self.golden_paths {
            if let Ok(metadata) = registry.get_metadata(&task.workflow_name) {
                let workflow_file = self.base_dir.join(&metadata.workflow_file);
                let source = std::fs::read_to_string(&workflow_file).map_err(OrchestratorError::from)?;
                let mut workflow = Workflow::parse_yaml(&source)?;

                let user_params: HashMap<String, String> = task
                    .workflow_payload
                    .get("params")
                    .and_then(|v| v.as_object())
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                let resolved = params::merge_with_defaults(&metadata.parameters, &user_params)
                    .map_err(OrchestratorError::from)?;
                for (key, value) in resolved {
                    workflow.variables.insert(key, value);
                }
                return Ok(workflow);
            }
        }

        let file: WorkflowFile = serde_json::from_value(task.workflow_payload.clone())
            .map_err(OrchestratorError::from)?;
        Ok(file.into_workflow())
    }
}

/// Drives one worker's claim/execute/report loop. Multiple `Worker`s
/// (`QueueConfig::workers` of them) run concurrently against the same
/// queue and registry, each with its own generated `worker_id`.
pub struct Worker {
    id: String,
    queue: Arc<dyn TaskQueue>,
    platform: Arc<PlatformRegistry>,
    resolver: Arc<WorkflowResolver>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    graphs: Arc<GraphStore>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn TaskQueue>,
        platform: Arc<PlatformRegistry>,
        resolver: Arc<WorkflowResolver>,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self::with_graph_store(id, queue, platform, resolver, poll_interval, heartbeat_interval, Arc::new(GraphStore::new()))
    }

    /// Like [`Worker::new`] but shares a [`GraphStore`] across every
    /// worker in the pool, so a claimed task's materialised graph
    /// remains queryable (e.g. for `ExportGraph`) after the task
    /// completes. See SPEC_FULL.md §4.D.
    pub fn with_graph_store(
        id: impl Into<String>,
        queue: Arc<dyn TaskQueue>,
        platform: Arc<PlatformRegistry>,
        resolver: Arc<WorkflowResolver>,
        poll_interval: Duration,
        heartbeat_interval: Duration,
        graphs: Arc<GraphStore>,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            platform,
            resolver,
            poll_interval,
            heartbeat_interval,
            graphs,
        }
    }

    pub fn graph_store(&self) -> &Arc<GraphStore> {
        &self.graphs
    }

    /// Runs forever, polling for claimable work. Intended to be driven
    /// by `tokio::spawn`, one task per configured worker.
    pub async fn run(&self) {
        loop {
            match self.queue.claim(&self.id).await {
                Ok(Some(task)) => self.execute_claimed(task).await,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(err) => {
                    error!(worker = %self.id, error = %err, "claim failed, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn execute_claimed(&self, task: QueueTask) {
        let task_id = task.id;
        info!(worker = %self.id, task_id = %task_id, app = %task.app_name, "claimed task");

        let heartbeat_handle = {
            let queue = Arc::clone(&self.queue);
            let worker_id = self.id.clone();
            let interval = self.heartbeat_interval;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if queue.heartbeat(task_id, &worker_id).await.is_err() {
                        break;
                    }
                }
            })
        };

        let outcome = self.run_workflow(&task).await;
        heartbeat_handle.abort();

        if let Err(err) = self.queue.report_outcome(task_id, &self.id, outcome).await {
            warn!(worker = %self.id, task_id = %task_id, error = %err, "failed to report task outcome");
        }
    }

    async fn run_workflow(&self, task: &QueueTask) -> TaskOutcome {
        let workflow = match self.resolver.resolve(task) {
            Ok(w) => w,
            Err(err) => {
                return TaskOutcome::Failed { message: err.to_string(), retriable: false };
            }
        };

        let mut graph = ExecutionGraph::from_workflow(task.app_name.clone(), &workflow);
        let executor = match WorkflowExecutor::new(workflow, self.platform.provisioner_registry()) {
            Ok(e) => e,
            Err(err) => {
                return TaskOutcome::Failed { message: err.to_string(), retriable: false };
            }
        };

        let outcome = match executor.execute(&mut graph).await {
            Ok(results) => {
                let failed: Vec<_> = results
                    .values()
                    .filter(|r| matches!(r.state, orchestrator_core::dag::NodeState::Failed))
                    .collect();

                if let Some(first_failure) = failed.first() {
                    let message = first_failure
                        .error
                        .clone()
                        .unwrap_or_else(|| "step failed".to_string());
                    let retriable = !message.starts_with(FATAL_STEP_PREFIX);
                    TaskOutcome::Failed { message, retriable }
                } else {
                    let payload = serde_json::to_value(&results).unwrap_or(serde_json::Value::Null);
                    TaskOutcome::Completed(payload)
                }
            }
            Err(err) => TaskOutcome::Failed { message: err.to_string(), retriable: false },
        };

        self.graphs.put(graph);
        outcome
    }
}

/// Spawns `count` workers sharing one [`GraphStore`], each its own
/// `tokio::spawn`ed task, returning their join handles so a caller can
/// await/cancel the pool.
pub fn spawn_pool(
    count: usize,
    queue: Arc<dyn TaskQueue>,
    platform: Arc<PlatformRegistry>,
    resolver: Arc<WorkflowResolver>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
) -> Vec<tokio::task::JoinHandle<()>> {
    spawn_pool_with_graph_store(
        count,
        queue,
        platform,
        resolver,
        poll_interval,
        heartbeat_interval,
        Arc::new(GraphStore::new()),
    )
    .0
}

/// Like [`spawn_pool`] but takes (and returns) the shared [`GraphStore`]
/// every worker in the pool writes its completed graphs into, so a
/// caller can query it (`ExportGraph`) while the pool is running.
pub fn spawn_pool_with_graph_store(
    count: usize,
    queue: Arc<dyn TaskQueue>,
    platform: Arc<PlatformRegistry>,
    resolver: Arc<WorkflowResolver>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    graphs: Arc<GraphStore>,
) -> (Vec<tokio::task::JoinHandle<()>>, Arc<GraphStore>) {
    let handles = (0..count)
        .map(|i| {
            let worker = Worker::with_graph_store(
                format!("worker-{i}"),
                Arc::clone(&queue),
                Arc::clone(&platform),
                Arc::clone(&resolver),
                poll_interval,
                heartbeat_interval,
                Arc::clone(&graphs),
            );
            tokio::spawn(async move { worker.run().await })
        })
        .collect();
    (handles, graphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryQueue;
    use orchestrator_core::provisioner::{CancellationToken, Provisioner, ProvisionState, Resource};
    use async_trait::async_trait;

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
        fn validate_config(&self, _config: &serde_json::Value) -> orchestrator_core::error::Result<()> {
            Ok(())
        }
        async fn provision(
            &self,
            _resource: &mut Resource,
            _config: &serde_json::Value,
            _cancellation: &CancellationToken,
        ) -> orchestrator_core::error::Result<()> {
            Ok(())
        }
        async fn deprovision(&self, _resource: &mut Resource, _cancellation: &CancellationToken) -> orchestrator_core::error::Result<()> {
            Ok(())
        }
        async fn get_status(&self, _resource: &Resource) -> orchestrator_core::error::Result<ProvisionState> {
            Ok(ProvisionState::Ready)
        }
    }

    fn inline_task() -> QueueTask {
        let payload = serde_json::json!({
            "apiVersion": "workflow.dev/v1",
            "kind": "Workflow",
            "metadata": {"name": "demo"},
            "steps": [{"name": "a", "type": "noop"}]
        });
        QueueTask::new("app", "inline", payload)
    }

    #[tokio::test]
    async fn claims_resolves_and_completes_an_inline_task() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(10, Duration::from_secs(60)));
        let platform = Arc::new(PlatformRegistry::new());
        platform.register_provisioner(Arc::new(AlwaysSucceeds)).unwrap();
        let resolver = Arc::new(WorkflowResolver::new(None, "."));

        let id = queue.enqueue(inline_task()).await.unwrap();
        let worker = Worker::new("w", Arc::clone(&queue), platform, resolver, Duration::from_millis(10), Duration::from_secs(30));

        let claimed = queue.claim("w").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        worker.execute_claimed(claimed).await;

        let task = queue.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::task::TaskStatus::Completed);
    }
}
