// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Shell-step provisioner. Config shape:
//!
//! ```yaml
//! config:
//!   command: "echo hi"
//!   args: ["-n"]        # optional, appended after a shell -c invocation
//!   cwd: "/srv/app"      # optional
//!   env: {FOO: "bar"}    # optional, merged on top of the process env
//! ```
//!
//! Outputs written to `resource.properties`: `stdout`, `stderr` (both
//! trimmed of trailing newlines), and `exit_code`. A non-zero exit code
//! is a `FatalStep` error — a shell command that ran to completion and
//! reported failure is not something retrying the same command again
//! will usually fix.

use async_trait::async_trait;
use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::provisioner::{CancellationToken, ProvisionState, Provisioner, Resource};
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, serde::Deserialize)]
struct BashConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct BashProvisioner;

#[async_trait]
impl Provisioner for BashProvisioner {
    fn name(&self) -> &str {
        "bash-exec"
    }

    fn provisioner_type(&self) -> &str {
        "bash"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<()> {
        let parsed: BashConfig = serde_json::from_value(config.clone())
            .map_err(|e| OrchestratorError::Configuration(format!("invalid bash step config: {e}")))?;
        if parsed.command.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "bash step config.command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn provision(
        &self,
        resource: &mut Resource,
        config: &serde_json::Value,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        self.validate_config(config)?;
        let parsed: BashConfig = serde_json::from_value(config.clone())?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&parsed.command);
        for arg in &parsed.args {
            cmd.arg(arg);
        }
        if let Some(cwd) = &parsed.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &parsed.env {
            cmd.env(k, v);
        }
        cmd.kill_on_drop(true);

        let mut child = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| OrchestratorError::Transient(format!("failed to spawn bash step: {e}")))?;

        loop {
            if cancellation.is_cancelled() {
                let _ = child.kill().await;
                return Err(OrchestratorError::Concurrency("cancelled".to_string()));
            }
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => tokio::time::sleep(Duration::from_millis(25)).await,
                Err(e) => return Err(OrchestratorError::Transient(format!("bash step wait failed: {e}"))),
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OrchestratorError::Transient(format!("bash step output failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        resource.properties.insert("stdout".to_string(), serde_json::json!(stdout));
        resource.properties.insert("stderr".to_string(), serde_json::json!(stderr));
        resource
            .properties
            .insert("exit_code".to_string(), serde_json::json!(exit_code));

        if !output.status.success() {
            return Err(OrchestratorError::FatalStep(format!(
                "command exited with status {exit_code}: {stderr}"
            )));
        }
        Ok(())
    }

    async fn deprovision(&self, resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
        resource.properties.remove("stdout");
        resource.properties.remove("stderr");
        resource.properties.remove("exit_code");
        Ok(())
    }

    async fn get_status(&self, resource: &Resource) -> Result<ProvisionState> {
        match resource.properties.get("exit_code").and_then(|v| v.as_i64()) {
            Some(0) => Ok(ProvisionState::Ready),
            Some(_) => Ok(ProvisionState::Failed),
            None => Ok(ProvisionState::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let p = BashProvisioner;
        let config = serde_json::json!({"command": "echo hi"});
        let mut resource = Resource::new("r");
        p.provision(&mut resource, &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resource.properties["stdout"], serde_json::json!("hi"));
        assert_eq!(resource.properties["exit_code"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_fatal_step_error() {
        let p = BashProvisioner;
        let config = serde_json::json!({"command": "exit 3"});
        let mut resource = Resource::new("r");
        let err = p
            .provision(&mut resource, &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::FatalStep(_)));
    }

    #[test]
    fn empty_command_rejected_at_validation() {
        let p = BashProvisioner;
        let config = serde_json::json!({"command": ""});
        assert!(p.validate_config(&config).is_err());
    }

    #[test]
    fn missing_command_field_rejected() {
        let p = BashProvisioner;
        let config = serde_json::json!({});
        assert!(p.validate_config(&config).is_err());
    }
}
