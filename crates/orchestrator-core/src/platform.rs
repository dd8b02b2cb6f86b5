// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Platform manifest loading and the process-wide platform/provisioner
//! registry. See SPEC_FULL.md §4.C.

use crate::error::{OrchestratorError, Result};
use crate::provisioner::{Provisioner, ProvisionerRegistry};
use crate::version::{Requirement, Version};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub provisioner_type: String,
    pub version: String,
    #[serde(default, rename = "schemaRef")]
    pub schema_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compatibility {
    #[serde(rename = "minCoreVersion")]
    pub min_core_version: String,
    #[serde(default, rename = "maxCoreVersion")]
    pub max_core_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    #[serde(rename = "apiVersion")]
    #[allow(dead_code)]
    api_version: String,
    kind: String,
    metadata: RawMetadata,
    compatibility: Compatibility,
    #[serde(default)]
    provisioners: Vec<ProvisionerDescriptor>,
    #[serde(default)]
    goldenpaths: Vec<String>,
    #[serde(default)]
    resources: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMetadata {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
}

/// A parsed, validated platform manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub compatibility: Compatibility,
    pub provisioners: Vec<ProvisionerDescriptor>,
    pub golden_paths: Vec<String>,
    pub resources: serde_json::Map<String, serde_json::Value>,
}

impl PlatformManifest {
    pub fn parse(source: &str) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(source)?;
        if raw.kind != "Platform" {
            return Err(OrchestratorError::Configuration(format!(
                "expected kind 'Platform', got '{}'",
                raw.kind
            )));
        }
        if raw.metadata.name.is_empty() {
            return Err(OrchestratorError::Configuration(
                "platform manifest metadata.name is required".to_string(),
            ));
        }
        Version::parse(&raw.metadata.version)
            .map_err(OrchestratorError::Configuration)?;

        Ok(PlatformManifest {
            name: raw.metadata.name,
            version: raw.metadata.version,
            description: raw.metadata.description,
            compatibility: raw.compatibility,
            provisioners: raw.provisioners,
            golden_paths: raw.goldenpaths,
            resources: raw.resources,
        })
    }

    /// Checks `core_version` against this manifest's compatibility
    /// window: `>= minCoreVersion` and, if declared, `< maxCoreVersion`.
    pub fn check_compatibility(&self, core_version: &str) -> Result<()> {
        let core = Version::parse(core_version).map_err(OrchestratorError::Configuration)?;

        let min = Requirement::parse(&format!(">={}", self.compatibility.min_core_version))
            .map_err(OrchestratorError::Configuration)?;
        if !min.satisfied_by(&core) {
            return Err(OrchestratorError::Configuration(format!(
                "platform '{}' requires core version >= {}, found {}",
                self.name, self.compatibility.min_core_version, core_version
            )));
        }

        if let Some(max) = &self.compatibility.max_core_version {
            let max_req =
                Requirement::parse(&format!("<{max}")).map_err(OrchestratorError::Configuration)?;
            if !max_req.satisfied_by(&core) {
                return Err(OrchestratorError::Configuration(format!(
                    "platform '{}' requires core version < {}, found {}",
                    self.name, max, core_version
                )));
            }
        }
        Ok(())
    }
}

/// Process-wide registry of loaded platform manifests, backed by the
/// same provisioner registry that steps resolve their provisioners
/// from. Safe under concurrent reads and writes.
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: DashMap<String, PlatformManifest>,
    provisioners: ProvisionerRegistry,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates a manifest from a single file, checking it
    /// against `core_version` before registering it.
    pub fn load_from_file(&self, path: impl AsRef<Path>, core_version: &str) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let manifest = PlatformManifest::parse(&content)?;
        manifest.check_compatibility(core_version)?;
        self.register_platform(manifest)
    }

    /// Walks one level of `root`, loading `platform.yaml`/`platform.yml`.
    /// Files with structural errors surface as errors; a missing file
    /// is silently skipped.
    pub fn load_from_directory(&self, root: impl AsRef<Path>, core_version: &str) -> Result<()> {
        let root = root.as_ref();
        for candidate in ["platform.yaml", "platform.yml"] {
            let path = root.join(candidate);
            if path.exists() {
                self.load_from_file(path, core_version)?;
            }
        }
        Ok(())
    }

    pub fn register_platform(&self, manifest: PlatformManifest) -> Result<()> {
        if self.platforms.contains_key(&manifest.name) {
            return Err(OrchestratorError::Contract(format!(
                "platform '{}' is already registered",
                manifest.name
            )));
        }
        self.platforms.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    pub fn register_provisioner(&self, provisioner: Arc<dyn Provisioner>) -> Result<()> {
        self.provisioners.register(provisioner)
    }

    pub fn get_provisioner(&self, provisioner_type: &str) -> Result<Arc<dyn Provisioner>> {
        self.provisioners.get(provisioner_type)
    }

    pub fn has_provisioner(&self, provisioner_type: &str) -> bool {
        self.provisioners.is_registered(provisioner_type)
    }

    pub fn list_platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.platforms.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn list_provisioners(&self) -> Vec<String> {
        self.provisioners.list()
    }

    pub fn count(&self) -> usize {
        self.platforms.len()
    }

    /// Exposes the backing provisioner registry so a caller can
    /// construct a [`crate::executor::WorkflowExecutor`] against it
    /// without re-registering every provisioner on a second registry.
    pub fn provisioner_registry(&self) -> &ProvisionerRegistry {
        &self.provisioners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: platform.dev/v1
kind: Platform
metadata:
  name: aws-eks
  version: 1.4.0
  description: AWS EKS platform
compatibility:
  minCoreVersion: "1.0.0"
  maxCoreVersion: "2.0.0"
provisioners:
  - name: bash-exec
    type: bash
    version: "1.0.0"
goldenpaths: ["deploy-app"]
"#;

    #[test]
    fn parses_well_formed_manifest() {
        let manifest = PlatformManifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.name, "aws-eks");
        assert_eq!(manifest.provisioners.len(), 1);
        assert_eq!(manifest.golden_paths, vec!["deploy-app".to_string()]);
    }

    #[test]
    fn rejects_wrong_kind() {
        let bad = MANIFEST.replace("kind: Platform", "kind: Workflow");
        assert!(PlatformManifest::parse(&bad).is_err());
    }

    #[test]
    fn compatibility_window_is_enforced() {
        let manifest = PlatformManifest::parse(MANIFEST).unwrap();
        assert!(manifest.check_compatibility("1.5.0").is_ok());
        assert!(manifest.check_compatibility("0.9.0").is_err());
        assert!(manifest.check_compatibility("2.0.0").is_err());
    }

    #[test]
    fn duplicate_platform_registration_errors() {
        let registry = PlatformRegistry::new();
        registry
            .register_platform(PlatformManifest::parse(MANIFEST).unwrap())
            .unwrap();
        let err = registry.register_platform(PlatformManifest::parse(MANIFEST).unwrap());
        assert!(err.is_err());
    }
}
