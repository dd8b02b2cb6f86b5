// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! GitOps-commit step, stubbed out: the workspace carries no git client
//! dependency, so this provisioner writes the rendered manifest to a
//! local path and records a synthetic commit identifier as its output
//! rather than pushing to a real repository. It exists so golden paths
//! that model a "commit the manifest" step can be authored and executed
//! end to end today; swapping in a real git backend later only touches
//! this file, not the workflows that reference `gitops-commit`.
//!
//! Config shape:
//!
//! ```yaml
//! config:
//!   path: "/srv/manifests/app.yaml"
//!   contents: "apiVersion: v1\n..."
//!   message: "deploy app v1.2.3"   # optional
//! ```
//!
//! Outputs: `commit_id` (a random identifier standing in for a real SHA)
//! and `path`.

use async_trait::async_trait;
use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::provisioner::{CancellationToken, ProvisionState, Provisioner, Resource};

#[derive(Debug, serde::Deserialize)]
struct GitOpsConfig {
    path: String,
    contents: String,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Debug, Default)]
pub struct GitOpsCommitProvisioner;

#[async_trait]
impl Provisioner for GitOpsCommitProvisioner {
    fn name(&self) -> &str {
        "gitops-commit"
    }

    fn provisioner_type(&self) -> &str {
        "gitops-commit"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<()> {
        let parsed: GitOpsConfig = serde_json::from_value(config.clone())
            .map_err(|e| OrchestratorError::Configuration(format!("invalid gitops-commit step config: {e}")))?;
        if parsed.path.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "gitops-commit step config.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn provision(
        &self,
        resource: &mut Resource,
        config: &serde_json::Value,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        self.validate_config(config)?;
        let parsed: GitOpsConfig = serde_json::from_value(config.clone())?;

        if let Some(parent) = std::path::Path::new(&parsed.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OrchestratorError::Transient(format!("failed to create manifest dir: {e}")))?;
            }
        }
        tokio::fs::write(&parsed.path, &parsed.contents)
            .await
            .map_err(|e| OrchestratorError::Transient(format!("failed to write manifest: {e}")))?;

        let commit_id = uuid::Uuid::new_v4().to_string();
        resource
            .properties
            .insert("commit_id".to_string(), serde_json::json!(commit_id));
        resource
            .properties
            .insert("path".to_string(), serde_json::json!(parsed.path));
        Ok(())
    }

    async fn deprovision(&self, resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
        if let Some(path) = resource.properties.get("path").and_then(|v| v.as_str()) {
            let _ = tokio::fs::remove_file(path).await;
        }
        resource.properties.remove("commit_id");
        resource.properties.remove("path");
        Ok(())
    }

    async fn get_status(&self, resource: &Resource) -> Result<ProvisionState> {
        match resource.properties.get("commit_id") {
            Some(_) => Ok(ProvisionState::Ready),
            None => Ok(ProvisionState::Unknown),
        }
    }
}
