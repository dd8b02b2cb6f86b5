// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Execution context: the mutable state threaded through one workflow
//! run — resolved variables, per-step outputs, resource attributes, and
//! condition evaluation. See SPEC_FULL.md §4.E.

use crate::error::Result;
use crate::variables::{interpolate, interpolate_json, ResolutionMode, VariableScope};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Accumulated state for a single workflow execution. Built once per
/// run and mutated as steps complete.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub workflow_vars: HashMap<String, String>,
    pub step_outputs: HashMap<String, HashMap<String, String>>,
    pub resources: HashMap<String, HashMap<String, String>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `workflow_vars` from a workflow's declared variables,
    /// interpolating each in left-to-right declaration order so later
    /// entries may reference earlier ones via `${workflow.KEY}`.
    pub fn seed_workflow_variables(&mut self, variables: &IndexMap<String, String>) -> Result<()> {
        for (key, raw_value) in variables {
            let scope = self.scope(&HashMap::new());
            let value = interpolate(raw_value, &scope, ResolutionMode::Lenient)?;
            self.workflow_vars.insert(key.clone(), value);
        }
        Ok(())
    }

    /// Records a completed step's declared outputs.
    pub fn record_step_outputs(&mut self, step_name: &str, outputs: HashMap<String, String>) {
        self.step_outputs.insert(step_name.to_string(), outputs);
    }

    /// Records attributes for the implicit resource a step configures.
    /// Per convention, each step owns exactly one resource named after
    /// itself (the distilled data model has no separate resource-
    /// declaration block).
    pub fn record_resource(&mut self, resource_name: &str, attrs: HashMap<String, String>) {
        self.resources.insert(resource_name.to_string(), attrs);
    }

    pub fn scope<'a>(&'a self, step_env: &'a HashMap<String, String>) -> VariableScope<'a> {
        VariableScope {
            workflow_vars: &self.workflow_vars,
            step_outputs: &self.step_outputs,
            resources: &self.resources,
            step_env,
        }
    }

    pub fn interpolate_str(
        &self,
        text: &str,
        step_env: &HashMap<String, String>,
        mode: ResolutionMode,
    ) -> Result<String> {
        interpolate(text, &self.scope(step_env), mode)
    }

    pub fn interpolate_config(
        &self,
        config: &serde_json::Value,
        step_env: &HashMap<String, String>,
        mode: ResolutionMode,
    ) -> Result<serde_json::Value> {
        interpolate_json(config, &self.scope(step_env), mode)
    }

    /// Evaluates a step's `when`/`if`/`unless` predicate expression.
    ///
    /// The distilled data model has no boolean expression grammar, so a
    /// predicate is treated as a variable reference (or literal text)
    /// that is interpolated and then read for truthiness: empty string,
    /// `"false"`, and `"0"` are false; everything else is true. An
    /// unresolved reference resolves (in lenient mode) to the empty
    /// string, so it reads as false rather than true.
    pub fn evaluate_predicate(
        &self,
        expr: &str,
        negate: bool,
        step_env: &HashMap<String, String>,
    ) -> Result<bool> {
        let resolved = self.interpolate_str(expr, step_env, ResolutionMode::Lenient)?;
        let truthy = !matches!(resolved.trim(), "" | "false" | "0");
        Ok(if negate { !truthy } else { truthy })
    }
}
