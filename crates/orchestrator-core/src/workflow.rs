// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Workflow and step data types. See SPEC_FULL.md §3.

use crate::error::{OrchestratorError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One step in a workflow. `step_type` is an open string resolved
/// against the provisioner registry at execution time, not a closed
/// enum — the set of provisioner types is extensible at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default, rename = "setVariables")]
    pub set_variables: IndexMap<String, String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default, rename = "if")]
    pub if_: Option<String>,
    #[serde(default)]
    pub unless: Option<String>,
    #[serde(default, rename = "continueOnFailure")]
    pub continue_on_failure: bool,
    #[serde(default, rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

impl Step {
    /// Returns the step's predicate expression and whether its truth
    /// value should be negated (`unless`), collapsing the three
    /// spec-level synonyms `when`/`if`/`unless` into one. When more than
    /// one is set, `when` wins, then `if`, then `unless` — the spec
    /// treats them as aliases for the same field, so this is a
    /// deterministic tie-break rather than a meaningful precedence.
    pub fn predicate(&self) -> Option<(&str, bool)> {
        if let Some(expr) = &self.when {
            Some((expr.as_str(), false))
        } else if let Some(expr) = &self.if_ {
            Some((expr.as_str(), false))
        } else {
            self.unless.as_deref().map(|expr| (expr, true))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    pub steps: Vec<Step>,
}

/// On-disk workflow file shape: `apiVersion`/`kind`/`metadata.name` with
/// either `spec.steps` or a top-level `steps` list.
#[derive(Debug, Deserialize)]
pub struct WorkflowFile {
    #[serde(default, rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub spec: Option<WorkflowSpec>,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub variables: Option<IndexMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowSpec {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

impl WorkflowFile {
    pub fn into_workflow(self) -> Workflow {
        if let Some(spec) = self.spec {
            Workflow {
                name: self.metadata.name,
                variables: spec.variables,
                steps: spec.steps,
            }
        } else {
            Workflow {
                name: self.metadata.name,
                variables: self.variables.unwrap_or_default(),
                steps: self.steps.unwrap_or_default(),
            }
        }
    }
}

impl Workflow {
    pub fn parse_yaml(source: &str) -> Result<Self> {
        let file: WorkflowFile = serde_yaml::from_str(source)?;
        Ok(file.into_workflow())
    }

    /// Structural validation: unique step names, `dependsOn` entries
    /// must name earlier steps in the same workflow.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(OrchestratorError::Configuration(
                "workflow has no steps".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if step.name.is_empty() {
                return Err(OrchestratorError::Configuration(
                    "step name must not be empty".to_string(),
                ));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(OrchestratorError::Configuration(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(OrchestratorError::Configuration(format!(
                        "step '{}' depends on '{}', which is not an earlier step",
                        step.name, dep
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, depends_on: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            step_type: "bash".to_string(),
            config: serde_json::Value::Null,
            env: IndexMap::new(),
            set_variables: IndexMap::new(),
            outputs: Vec::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            when: None,
            if_: None,
            unless: None,
            continue_on_failure: false,
            timeout_seconds: None,
        }
    }

    #[test]
    fn depends_on_must_reference_earlier_step() {
        let wf = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", &["b"]), step("b", &[])],
        };
        assert!(wf.validate().is_err());
    }

    #[test]
    fn well_formed_workflow_validates() {
        let wf = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", &[]), step("b", &["a"])],
        };
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn duplicate_step_name_rejected() {
        let wf = Workflow {
            name: "w".to_string(),
            variables: IndexMap::new(),
            steps: vec![step("a", &[]), step("a", &[])],
        };
        assert!(wf.validate().is_err());
    }

    #[test]
    fn predicate_prefers_when_then_if_then_unless() {
        let mut s = step("a", &[]);
        s.unless = Some("u".to_string());
        assert_eq!(s.predicate(), Some(("u", true)));

        s.if_ = Some("i".to_string());
        assert_eq!(s.predicate(), Some(("i", false)));

        s.when = Some("w".to_string());
        assert_eq!(s.predicate(), Some(("w", false)));
    }

    #[test]
    fn top_level_steps_shape_parses() {
        let yaml = r#"
apiVersion: workflow.dev/v1
kind: Workflow
metadata:
  name: demo
variables:
  greeting: hello
steps:
  - name: say-hi
    type: bash
    config:
      command: "echo hi"
"#;
        let wf = Workflow::parse_yaml(yaml).unwrap();
        assert_eq!(wf.name, "demo");
        assert_eq!(wf.variables["greeting"], "hello");
        assert_eq!(wf.steps.len(), 1);
    }

    #[test]
    fn spec_steps_shape_parses() {
        let yaml = r#"
apiVersion: workflow.dev/v1
kind: Workflow
metadata:
  name: demo
spec:
  variables:
    greeting: hello
  steps:
    - name: say-hi
      type: bash
      config:
        command: "echo hi"
"#;
        let wf = Workflow::parse_yaml(yaml).unwrap();
        assert_eq!(wf.steps.len(), 1);
        assert_eq!(wf.variables["greeting"], "hello");
    }
}
