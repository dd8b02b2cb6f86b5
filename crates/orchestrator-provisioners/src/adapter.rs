// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Adapter for wrapping a synchronous, pre-async-trait provisioner
//! implementation so it can be registered against the same
//! `ProvisionerRegistry` as every other step type, without the callers
//! that still hold onto a `LegacySyncProvisioner` needing to change.
//!
//! This is a seam for organizations migrating an in-house step runner
//! onto this executor one provisioner at a time: implement
//! `LegacySyncProvisioner`, wrap it in `LegacyProvisionerAdapter`,
//! register the adapter.

use async_trait::async_trait;
use orchestrator_core::error::Result;
use orchestrator_core::provisioner::{CancellationToken, ProvisionState, Provisioner, Resource};
use std::sync::Arc;

/// The interface an older, blocking provisioner implements. No
/// cancellation parameter — a legacy provisioner is assumed to run to
/// completion once started, since that was the contract it was written
/// against.
pub trait LegacySyncProvisioner: Send + Sync {
    fn name(&self) -> &str;
    fn provisioner_type(&self) -> &str;
    fn version(&self) -> &str;
    fn validate_config(&self, config: &serde_json::Value) -> Result<()>;
    fn provision(&self, resource: &mut Resource, config: &serde_json::Value) -> Result<()>;
    fn deprovision(&self, resource: &mut Resource) -> Result<()>;
    fn get_status(&self, resource: &Resource) -> Result<ProvisionState>;
}

/// Wraps a [`LegacySyncProvisioner`] behind the async [`Provisioner`]
/// trait. Each call runs the inner provisioner on a blocking thread so
/// it cannot stall the executor's async runtime; cancellation is not
/// propagated into the blocking call, since the legacy contract has no
/// way to receive it — a caller deprovisioning after the fact is the
/// only way to unwind one of these once started.
pub struct LegacyProvisionerAdapter {
    inner: Arc<dyn LegacySyncProvisioner>,
}

impl LegacyProvisionerAdapter {
    pub fn new(inner: Arc<dyn LegacySyncProvisioner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Provisioner for LegacyProvisionerAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn provisioner_type(&self) -> &str {
        self.inner.provisioner_type()
    }

    fn version(&self) -> &str {
        self.inner.version()
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<()> {
        self.inner.validate_config(config)
    }

    async fn provision(
        &self,
        resource: &mut Resource,
        config: &serde_json::Value,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        let inner = self.inner.clone();
        let mut owned = resource.clone();
        let config = config.clone();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = inner.provision(&mut owned, &config);
            (owned, outcome)
        })
        .await
        .map_err(|e| orchestrator_core::error::OrchestratorError::Other(format!("legacy provisioner task panicked: {e}")))?;
        *resource = result.0;
        result.1
    }

    async fn deprovision(&self, resource: &mut Resource, _cancellation: &CancellationToken) -> Result<()> {
        let inner = self.inner.clone();
        let mut owned = resource.clone();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = inner.deprovision(&mut owned);
            (owned, outcome)
        })
        .await
        .map_err(|e| orchestrator_core::error::OrchestratorError::Other(format!("legacy provisioner task panicked: {e}")))?;
        *resource = result.0;
        result.1
    }

    async fn get_status(&self, resource: &Resource) -> Result<ProvisionState> {
        let inner = self.inner.clone();
        let owned = resource.clone();
        tokio::task::spawn_blocking(move || inner.get_status(&owned))
            .await
            .map_err(|e| orchestrator_core::error::OrchestratorError::Other(format!("legacy provisioner task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LegacyNoop;

    impl LegacySyncProvisioner for LegacyNoop {
        fn name(&self) -> &str {
            "legacy-noop"
        }
        fn provisioner_type(&self) -> &str {
            "legacy-noop"
        }
        fn version(&self) -> &str {
            "0.9.0"
        }
        fn validate_config(&self, _config: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        fn provision(&self, resource: &mut Resource, _config: &serde_json::Value) -> Result<()> {
            resource.properties.insert("ran".to_string(), serde_json::json!(true));
            Ok(())
        }
        fn deprovision(&self, resource: &mut Resource) -> Result<()> {
            resource.properties.remove("ran");
            Ok(())
        }
        fn get_status(&self, resource: &Resource) -> Result<ProvisionState> {
            if resource.properties.contains_key("ran") {
                Ok(ProvisionState::Ready)
            } else {
                Ok(ProvisionState::Unknown)
            }
        }
    }

    #[tokio::test]
    async fn wraps_legacy_provision_call() {
        let adapter = LegacyProvisionerAdapter::new(Arc::new(LegacyNoop));
        let mut resource = Resource::new("r");
        adapter
            .provision(&mut resource, &serde_json::Value::Null, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resource.properties.get("ran"), Some(&serde_json::json!(true)));
        assert_eq!(adapter.get_status(&resource).await.unwrap(), ProvisionState::Ready);
    }

    #[tokio::test]
    async fn wraps_legacy_deprovision_call() {
        let adapter = LegacyProvisionerAdapter::new(Arc::new(LegacyNoop));
        let mut resource = Resource::new("r");
        adapter
            .provision(&mut resource, &serde_json::Value::Null, &CancellationToken::new())
            .await
            .unwrap();
        adapter
            .deprovision(&mut resource, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(adapter.get_status(&resource).await.unwrap(), ProvisionState::Unknown);
    }
}
