// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! HTTP webhook provisioner. Config shape:
//!
//! ```yaml
//! config:
//!   url: "https://hooks.example.com/deploy"
//!   method: "POST"            # optional, defaults to POST
//!   headers: {Authorization: "Bearer ..."}
//!   body: {"service": "api"}  # optional, any JSON value
//!   timeout_ms: 10000          # optional, defaults to 30000
//! ```
//!
//! Outputs written to `resource.properties`: `status_code` and `body`
//! (the response body as text; JSON responses are not parsed, since
//! callers reference them through the raw text and their own
//! downstream tooling). A non-2xx response is a `Transient` error so
//! that a caller wrapping this provisioner in [`orchestrator_core::retry`]
//! retries it; the provisioner applies its own small internal retry
//! budget for connection-level failures, since those are exactly the
//! kind of flakiness a single HTTP call runs into that the durable
//! queue's coarser, much slower retry loop is a poor fit for.

use async_trait::async_trait;
use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::provisioner::{CancellationToken, ProvisionState, Provisioner, Resource};
use orchestrator_core::retry::RetryPolicy;
use std::time::Duration;

#[derive(Debug, serde::Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Default)]
pub struct HttpProvisioner;

impl HttpProvisioner {
    fn client(&self, timeout_ms: u64) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("failed to build http client: {e}")))
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    fn name(&self) -> &str {
        "http-webhook"
    }

    fn provisioner_type(&self) -> &str {
        "http"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<()> {
        let parsed: HttpConfig = serde_json::from_value(config.clone())
            .map_err(|e| OrchestratorError::Configuration(format!("invalid http step config: {e}")))?;
        if parsed.url.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "http step config.url must not be empty".to_string(),
            ));
        }
        reqwest::Method::from_bytes(parsed.method.as_bytes())
            .map_err(|_| OrchestratorError::Configuration(format!("invalid http method: {}", parsed.method)))?;
        Ok(())
    }

    async fn provision(
        &self,
        resource: &mut Resource,
        config: &serde_json::Value,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        self.validate_config(config)?;
        let parsed: HttpConfig = serde_json::from_value(config.clone())?;
        let method = reqwest::Method::from_bytes(parsed.method.as_bytes())
            .map_err(|_| OrchestratorError::Configuration(format!("invalid http method: {}", parsed.method)))?;
        let client = self.client(parsed.timeout_ms)?;

        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0, Duration::from_secs(5));
        let mut last_err = None;
        for attempt in 0..policy.max_attempts {
            if cancellation.is_cancelled() {
                return Err(OrchestratorError::Concurrency("cancelled".to_string()));
            }
            let mut request = client.request(method.clone(), &parsed.url);
            for (k, v) in &parsed.headers {
                request = request.header(k, v);
            }
            if let Some(body) = &parsed.body {
                request = request.json(body);
            }
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp
                        .text()
                        .await
                        .map_err(|e| OrchestratorError::Transient(format!("failed to read response body: {e}")))?;
                    resource
                        .properties
                        .insert("status_code".to_string(), serde_json::json!(status.as_u16()));
                    resource.properties.insert("body".to_string(), serde_json::json!(text));
                    if status.is_success() {
                        return Ok(());
                    }
                    last_err = Some(OrchestratorError::Transient(format!(
                        "http step received status {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    last_err = Some(OrchestratorError::Transient(format!("http request failed: {e}")));
                }
            }
            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }
        Err(last_err.unwrap_or_else(|| OrchestratorError::Transient("http step exhausted retries".to_string())))
    }

    async fn deprovision(&self, resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
        resource.properties.remove("status_code");
        resource.properties.remove("body");
        Ok(())
    }

    async fn get_status(&self, resource: &Resource) -> Result<ProvisionState> {
        match resource.properties.get("status_code").and_then(|v| v.as_u64()) {
            Some(code) if (200..300).contains(&code) => Ok(ProvisionState::Ready),
            Some(_) => Ok(ProvisionState::Failed),
            None => Ok(ProvisionState::Unknown),
        }
    }
}
