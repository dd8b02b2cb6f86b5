// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! A provisioner that does nothing. Useful for golden paths that need a
//! placeholder step (a manual-approval gate, a documentation marker) or
//! as a fixture in tests that exercise the executor without touching
//! real infrastructure.

use async_trait::async_trait;
use orchestrator_core::error::Result;
use orchestrator_core::provisioner::{CancellationToken, ProvisionState, Provisioner, Resource};

#[derive(Debug, Default)]
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    fn name(&self) -> &str {
        "noop"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provision_always_succeeds() {
        let p = NoopProvisioner;
        let mut resource = Resource::new("r");
        p.provision(&mut resource, &serde_json::Value::Null, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(p.get_status(&resource).await.unwrap(), ProvisionState::Ready);
    }
}
