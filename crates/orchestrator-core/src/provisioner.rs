// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Pluggable provisioner registry. A provisioner is the thing that
//! actually does a step's work — shells out, calls a webhook, commits a
//! GitOps change — resolved at execution time by the step's `type`
//! string. See SPEC_FULL.md §4.C.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque caller identity, threaded through from the queue task to the
/// provisioner without the core ever inspecting its contents. Concrete
/// identity systems (service accounts, OIDC claims, ...) live outside
/// this crate and implement this trait.
pub trait IdentityContext: fmt::Debug + Send + Sync {
    fn principal(&self) -> &str;
}

/// Lifecycle state of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionState {
    Unknown,
    Provisioning,
    Ready,
    Degraded,
    Deprovisioning,
    Deprovisioned,
    Failed,
}

/// A human-facing pointer a provisioner attaches to a resource for
/// display — purely advisory, never used in dispatch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Hint {
    pub hint_type: String,
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// The resource a provisioner is asked to manage. `properties` is the
/// only state that survives between calls — provisioners themselves
/// hold no per-resource state in memory, per the stateless contract.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: serde_json::Map::new(),
        }
    }

    /// Flattens scalar properties to strings for interpolation as
    /// `resources.<name>.<attr>`. Nested objects/arrays are dropped —
    /// the variable grammar only reaches scalar leaves.
    pub fn flatten_properties(&self) -> HashMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
            .collect()
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Cooperative cancellation signal passed to a running provisioner.
/// The corpus carries no `tokio-util`, so this is hand-rolled: a
/// clonable flag a provisioner polls at I/O boundaries, as the design
/// document requires.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The provisioner contract: `Name`/`Type`/`Version` plus the
/// lifecycle methods. Implementations MUST be stateless — any state
/// that needs to survive a call lives in `resource.properties`, not in
/// the provisioner struct.
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &str;
    fn provisioner_type(&self) -> &str;
    fn version(&self) -> &str;

    fn validate_config(&self, config: &serde_json::Value) -> Result<()>;

    /// Does the step's work, writing any output attributes into
    /// `resource.properties` so later steps can resolve
    /// `resources.<name>.<attr>` and `<step>.<output>` references.
    async fn provision(
        &self,
        resource: &mut Resource,
        config: &serde_json::Value,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    async fn deprovision(&self, resource: &mut Resource, cancellation: &CancellationToken) -> Result<()>;

    async fn get_status(&self, resource: &Resource) -> Result<ProvisionState>;

    async fn get_hints(&self, resource: &Resource) -> Result<Vec<Hint>> {
        let _ = resource;
        Ok(Vec::new())
    }
}

/// Registry of provisioners keyed by step type. Reads and writes are
/// safe from any number of concurrent callers; registration takes an
/// exclusive slot only for its own key, lookups never block on it.
#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: DashMap<String, Arc<dyn Provisioner>>,
}

impl fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("types", &self.list())
            .finish()
    }
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provisioner under its own `provisioner_type()`.
    /// Duplicate registration of the same type is an error.
    pub fn register(&self, provisioner: Arc<dyn Provisioner>) -> Result<()> {
        let key = provisioner.provisioner_type().to_string();
        if self.provisioners.contains_key(&key) {
            return Err(OrchestratorError::Contract(format!(
                "provisioner type '{key}' is already registered"
            )));
        }
        self.provisioners.insert(key, provisioner);
        Ok(())
    }

    pub fn get(&self, step_type: &str) -> Result<Arc<dyn Provisioner>> {
        self.provisioners
            .get(step_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestratorError::ProvisionerNotFound(step_type.to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provisioners.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, step_type: &str) -> bool {
        self.provisioners.contains_key(step_type)
    }

    pub fn count(&self) -> usize {
        self.provisioners.len()
    }
}
