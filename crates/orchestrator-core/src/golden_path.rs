// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Golden-path registry: loads named workflow templates, resolves them
//! to workflow files, and synthesises legacy parameter schemas for
//! golden paths that predate typed `parameters`.
//!
//! See SPEC_FULL.md §4.B.

use crate::error::{OrchestratorError, Result};
use crate::params::ParameterSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenPath {
    pub name: String,
    pub workflow_file: PathBuf,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSchema>,
}

/// Raw, on-disk shape of one golden-path entry: either a bare workflow
/// path, or a full metadata object. Both must be accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Shorthand(String),
    Full {
        workflow: String,
        description: Option<String>,
        category: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
        estimated_duration: Option<String>,
        parameters: Option<HashMap<String, ParameterSchema>>,
        #[serde(default)]
        required_params: Vec<String>,
        #[serde(default)]
        optional_params: HashMap<String, String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawFile {
    goldenpaths: HashMap<String, RawEntry>,
}

impl GoldenPath {
    fn from_raw(name: &str, raw: RawEntry) -> Self {
        match raw {
            RawEntry::Shorthand(workflow) => GoldenPath {
                name: name.to_string(),
                workflow_file: PathBuf::from(workflow),
                description: None,
                category: None,
                tags: Vec::new(),
                estimated_duration: None,
                parameters: HashMap::new(),
            },
            RawEntry::Full {
                workflow,
                description,
                category,
                tags,
                estimated_duration,
                parameters,
                required_params,
                optional_params,
            } => {
                // `parameters` takes precedence if present; otherwise
                // synthesise legacy string schemas from required/optional
                // params for backward compatibility.
                let parameters = parameters.unwrap_or_else(|| {
                    let mut synthesised = HashMap::new();
                    for p in required_params {
                        synthesised.insert(p, ParameterSchema::legacy_string(true, None));
                    }
                    for (p, default) in optional_params {
                        synthesised
                            .insert(p, ParameterSchema::legacy_string(false, Some(default)));
                    }
                    synthesised
                });

                GoldenPath {
                    name: name.to_string(),
                    workflow_file: PathBuf::from(workflow),
                    description,
                    category,
                    tags,
                    estimated_duration,
                    parameters,
                }
            }
        }
    }
}

/// In-memory registry of golden paths, keyed by name.
#[derive(Debug, Default)]
pub struct GoldenPathRegistry {
    paths: HashMap<String, GoldenPath>,
}

impl GoldenPathRegistry {
    /// Parses a golden-paths YAML document (the `goldenpaths:` mapping).
    pub fn load(source: &str) -> Result<Self> {
        let raw: RawFile = serde_yaml::from_str(source)?;
        let mut paths = HashMap::new();
        for (name, entry) in raw.goldenpaths {
            if !NAME_RE.is_match(&name) {
                return Err(OrchestratorError::Configuration(format!(
                    "golden path name '{name}' must match ^[a-z][a-z0-9-]*[a-z0-9]$"
                )));
            }
            paths.insert(name.clone(), GoldenPath::from_raw(&name, entry));
        }
        Ok(Self { paths })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::load(&content)
    }

    /// Golden-path names, sorted lexicographically.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.paths.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_workflow_file(&self, name: &str) -> Result<&Path> {
        self.paths
            .get(name)
            .map(|p| p.workflow_file.as_path())
            .ok_or_else(|| OrchestratorError::GoldenPathNotFound(name.to_string()))
    }

    pub fn get_metadata(&self, name: &str) -> Result<&GoldenPath> {
        self.paths
            .get(name)
            .ok_or_else(|| OrchestratorError::GoldenPathNotFound(name.to_string()))
    }

    /// Verifies every registered workflow file exists on disk, relative
    /// to `base_dir`.
    pub fn validate_paths(&self, base_dir: impl AsRef<Path>) -> Result<()> {
        let base_dir = base_dir.as_ref();
        for path in self.paths.values() {
            let full = base_dir.join(&path.workflow_file);
            if !full.exists() {
                return Err(OrchestratorError::Configuration(format!(
                    "workflow file for golden path '{}' does not exist: {}",
                    path.name,
                    full.display()
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_and_full_shapes_both_parse() {
        let yaml = r#"
goldenpaths:
  deploy-app: ./workflows/deploy-app.yaml
  ephemeral-env:
    workflow: ./workflows/ephemeral-env.yaml
    description: "Spin up a short-lived environment"
    category: environments
    tags: [ephemeral, dev]
    estimated_duration: "5m"
    required_params: ["app_name"]
    optional_params:
      ttl: "2h"
"#;
        let registry = GoldenPathRegistry::load(yaml).unwrap();
        assert_eq!(registry.list(), vec!["deploy-app", "ephemeral-env"]);

        let deploy = registry.get_metadata("deploy-app").unwrap();
        assert!(deploy.parameters.is_empty());

        let ephemeral = registry.get_metadata("ephemeral-env").unwrap();
        assert!(ephemeral.parameters["app_name"].required);
        assert!(!ephemeral.parameters["ttl"].required);
        assert_eq!(
            ephemeral.parameters["ttl"].default.as_deref(),
            Some("2h")
        );
    }

    #[test]
    fn parameters_field_takes_precedence_over_legacy_fields() {
        let yaml = r#"
goldenpaths:
  p:
    workflow: w.yaml
    parameters:
      ttl:
        type: duration
        required: true
    required_params: ["ignored"]
"#;
        let registry = GoldenPathRegistry::load(yaml).unwrap();
        let meta = registry.get_metadata("p").unwrap();
        assert!(meta.parameters.contains_key("ttl"));
        assert!(!meta.parameters.contains_key("ignored"));
    }

    #[test]
    fn invalid_name_rejected() {
        let yaml = "goldenpaths:\n  Invalid_Name: w.yaml\n";
        assert!(GoldenPathRegistry::load(yaml).is_err());
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = GoldenPathRegistry::load("goldenpaths: {}\n").unwrap();
        assert!(registry.get_workflow_file("missing").is_err());
    }
}
