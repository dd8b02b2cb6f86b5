// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Builder API for submitting golden-path or raw-spec workflow runs
//! without hand-assembling a [`QueueTask`].
//!
//! This crate is the concrete, in-repo implementation of the
//! `SpecSource` interface SPEC_FULL.md §6 describes as an external
//! collaborator: a caller submits `(appName, goldenPathName? | rawSpec?,
//! parameters)` and gets back `(taskId, status=enqueued)`, or a
//! parameter-validation / unknown-golden-path / queue-full error before
//! the task ever reaches the queue. The CLI's `submit` command is the
//! other caller of this same builder.

use orchestrator_core::error::OrchestratorError;
use orchestrator_core::golden_path::GoldenPathRegistry;
use orchestrator_core::params;
use orchestrator_queue::error::{QueueError, Result};
use orchestrator_queue::store::TaskQueue;
use orchestrator_queue::task::QueueTask;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Response returned for a successfully enqueued submission, mirroring
/// SPEC_FULL.md §6's `(taskId, status=enqueued)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: &'static str,
}

/// Exactly one of `golden_path` or `raw_spec` must be set, per
/// SPEC_FULL.md §6 ("Exactly one of `goldenPathName` or `rawSpec` must
/// be set").
enum Source {
    GoldenPath(String),
    RawSpec(serde_json::Value),
}

/// Builds one workflow-execution submission. Construct with
/// [`WorkflowTaskBuilder::golden_path`] or [`WorkflowTaskBuilder::raw_spec`],
/// customise with the `with_*` methods, then [`WorkflowTaskBuilder::submit`].
pub struct WorkflowTaskBuilder {
    app_name: String,
    source: Source,
    parameters: HashMap<String, String>,
    identity: Option<serde_json::Value>,
    metadata: Option<serde_json::Value>,
    priority: Option<i16>,
    max_retries: Option<i32>,
}

impl WorkflowTaskBuilder {
    /// Submits a named golden path; `parameters` are validated and
    /// merged against its typed schema before the task is built.
    pub fn golden_path(app_name: impl Into<String>, golden_path_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            source: Source::GoldenPath(golden_path_name.into()),
            parameters: HashMap::new(),
            identity: None,
            metadata: None,
            priority: None,
            max_retries: None,
        }
    }

    /// Submits a raw workflow document (a `WorkflowFile`-shaped JSON
    /// value) with no golden-path indirection. `parameters` are ignored
    /// for this source — a raw spec carries its own `variables`.
    pub fn raw_spec(app_name: impl Into<String>, spec: serde_json::Value) -> Self {
        Self {
            app_name: app_name.into(),
            source: Source::RawSpec(spec),
            parameters: HashMap::new(),
            identity: None,
            metadata: None,
            priority: None,
            max_retries: None,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attaches the opaque, propagated-but-never-inspected identity
    /// context described in SPEC_FULL.md §3 (`QueueTask.identity`).
    pub fn with_identity(mut self, identity: serde_json::Value) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Priority is not yet wired to any caller-visible default-assignment
    /// API (SPEC_FULL.md §9 open question); callers that do pass one
    /// here override [`orchestrator_queue::task::DEFAULT_PRIORITY`].
    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Validates the submission and, on success, enqueues it. Errors
    /// before `queue.enqueue` is ever called are `ValidationError` /
    /// `Configuration` (unknown golden path); after that point a
    /// `QueueFull` can still surface from the queue itself.
    pub async fn submit(self, queue: &Arc<dyn TaskQueue>, golden_paths: Option<&GoldenPathRegistry>) -> Result<SubmitResponse> {
        let (workflow_name, payload) = self.resolve(golden_paths)?;

        let mut task = QueueTask::new(self.app_name, workflow_name, payload);
        if let Some(identity) = self.identity {
            task = task.with_identity(identity);
        }
        if let Some(metadata) = self.metadata {
            task = task.with_metadata(metadata);
        }
        if let Some(priority) = self.priority {
            task = task.with_priority(priority);
        }
        if let Some(max_retries) = self.max_retries {
            task = task.with_max_retries(max_retries);
        }

        let task_id = queue.enqueue(task).await?;
        Ok(SubmitResponse { task_id, status: "enqueued" })
    }

    /// Resolves this submission's workflow name and queue payload
    /// without touching the queue — exposed so callers (and tests) can
    /// validate a submission in isolation from enqueueing it.
    fn resolve(&self, golden_paths: Option<&GoldenPathRegistry>) -> Result<(String, serde_json::Value)> {
        match &self.source {
            Source::GoldenPath(name) => {
                let registry = golden_paths.ok_or_else(|| {
                    QueueError::Configuration("no golden-path registry configured".to_string())
                })?;
                let metadata = registry
                    .get_metadata(name)
                    .map_err(QueueError::Orchestrator)?;

                let resolved = params::merge_with_defaults(&metadata.parameters, &self.parameters)
                    .map_err(OrchestratorError::Validation)
                    .map_err(QueueError::Orchestrator)?;

                let payload = serde_json::json!({ "params": resolved });
                Ok((name.clone(), payload))
            }
            Source::RawSpec(spec) => {
                let name = spec
                    .get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or("raw")
                    .to_string();
                Ok((name, spec.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_queue::memory::InMemoryQueue;
    use std::time::Duration;

    fn golden_paths() -> GoldenPathRegistry {
        GoldenPathRegistry::load(
            r#"
goldenpaths:
  deploy-app:
    workflow: ./workflows/deploy-app.yaml
    parameters:
      sync_policy:
        type: string
        required: false
        default: manual
        allowedValues: [manual, auto]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn golden_path_submission_merges_defaults_and_enqueues() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(10, Duration::from_secs(60)));
        let registry = golden_paths();

        let response = WorkflowTaskBuilder::golden_path("my-app", "deploy-app")
            .with_parameter("sync_policy", "auto")
            .submit(&queue, Some(&registry))
            .await
            .unwrap();

        assert_eq!(response.status, "enqueued");
        let task = queue.get(response.task_id).await.unwrap().unwrap();
        assert_eq!(task.workflow_name, "deploy-app");
        assert_eq!(task.workflow_payload["params"]["sync_policy"], "auto");
    }

    #[tokio::test]
    async fn unknown_golden_path_is_rejected_before_enqueue() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(10, Duration::from_secs(60)));
        let registry = golden_paths();

        let err = WorkflowTaskBuilder::golden_path("my-app", "does-not-exist")
            .submit(&queue, Some(&registry))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Orchestrator(OrchestratorError::GoldenPathNotFound(_))));
    }

    #[tokio::test]
    async fn invalid_parameter_is_rejected_before_enqueue() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(10, Duration::from_secs(60)));
        let registry = golden_paths();

        let err = WorkflowTaskBuilder::golden_path("my-app", "deploy-app")
            .with_parameter("sync_policy", "bogus")
            .submit(&queue, Some(&registry))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Orchestrator(OrchestratorError::Validation(_))));
    }

    #[tokio::test]
    async fn raw_spec_submission_uses_metadata_name() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(10, Duration::from_secs(60)));

        let spec = serde_json::json!({
            "apiVersion": "workflow.dev/v1",
            "kind": "Workflow",
            "metadata": {"name": "inline-demo"},
            "steps": [{"name": "a", "type": "noop"}]
        });

        let response = WorkflowTaskBuilder::raw_spec("my-app", spec)
            .submit(&queue, None)
            .await
            .unwrap();

        let task = queue.get(response.task_id).await.unwrap().unwrap();
        assert_eq!(task.workflow_name, "inline-demo");
    }

    #[tokio::test]
    async fn queue_full_surfaces_as_an_error() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(1, Duration::from_secs(60)));
        let spec = |name: &str| {
            serde_json::json!({
                "metadata": {"name": name},
                "steps": [{"name": "a", "type": "noop"}]
            })
        };

        WorkflowTaskBuilder::raw_spec("app", spec("one"))
            .submit(&queue, None)
            .await
            .unwrap();

        let err = WorkflowTaskBuilder::raw_spec("app", spec("two"))
            .submit(&queue, None)
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::QueueFull(_)));
    }
}
