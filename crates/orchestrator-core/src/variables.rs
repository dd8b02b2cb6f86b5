// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Variable-reference extraction and interpolation. See SPEC_FULL.md §4.E.
//!
//! A reference is either braced (`${workflow.name}`) or bare
//! (`$step_output`). Resolution classifies each reference by prefix:
//! `workflow.` and `resources.` are dedicated namespaces; anything else
//! containing a dot is a `step.output` reference; anything else plain is
//! looked up first as a step-local env var, then a process env var.

use crate::error::{OrchestratorError, Result};
use crate::workflow::Step;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

static VAR_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// One parsed reference: its full matched text (including the `$`/`${}`
/// sigil) and the inner name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub full_match: String,
    pub name: String,
}

/// Scans `text` for `${...}` and `$IDENT` references, in order of
/// appearance.
pub fn extract_refs(text: &str) -> Vec<VarRef> {
    VAR_REF_RE
        .captures_iter(text)
        .map(|caps| {
            let full_match = caps.get(0).unwrap().as_str().to_string();
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .unwrap()
                .as_str()
                .to_string();
            VarRef { full_match, name }
        })
        .collect()
}

/// How strictly `interpolate` treats references it cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// An unresolved reference is an error.
    Strict,
    /// An unresolved reference logs a warning and is replaced with the
    /// empty string.
    Lenient,
}

/// Read-only view over the namespaces a reference can resolve against.
pub struct VariableScope<'a> {
    pub workflow_vars: &'a HashMap<String, String>,
    pub step_outputs: &'a HashMap<String, HashMap<String, String>>,
    pub resources: &'a HashMap<String, HashMap<String, String>>,
    pub step_env: &'a HashMap<String, String>,
}

impl<'a> VariableScope<'a> {
    /// Classifies and resolves one reference name against this scope's
    /// namespaces, per the priority order in SPEC_FULL.md §4.E:
    /// `workflow.` prefix, then `resources.` prefix, then dotted
    /// `step.output`, then plain (step-local env, then process env).
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(key) = name.strip_prefix("workflow.") {
            return self.workflow_vars.get(key).cloned();
        }
        if let Some(rest) = name.strip_prefix("resources.") {
            let (resource, attr) = rest.split_once('.')?;
            return self.resources.get(resource)?.get(attr).cloned();
        }
        if let Some((step, output)) = name.split_once('.') {
            return self.step_outputs.get(step)?.get(output).cloned();
        }
        if let Some(value) = self.step_env.get(name) {
            return Some(value.clone());
        }
        std::env::var(name).ok()
    }
}

/// Replaces every reference in `text` with its resolved value.
pub fn interpolate(text: &str, scope: &VariableScope, mode: ResolutionMode) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    for caps in VAR_REF_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .unwrap()
            .as_str();

        result.push_str(&text[last_end..whole.start()]);
        if name.is_empty() {
            // `${}` is always an error, in both strict and lenient mode —
            // there is no namespace under which an empty reference could
            // ever resolve, so leaving it in place would just defer a
            // guaranteed failure to whatever reads the interpolated text.
            return Err(OrchestratorError::UndefinedVariable(whole.as_str().to_string()));
        }
        match scope.resolve(name) {
            Some(value) => result.push_str(&value),
            None => match mode {
                ResolutionMode::Strict => {
                    return Err(OrchestratorError::UndefinedVariable(whole.as_str().to_string()))
                }
                ResolutionMode::Lenient => {
                    warn!(reference = %whole.as_str(), "undefined variable, substituting empty string");
                }
            },
        }
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    Ok(result)
}

/// Walks a JSON value (a `Step.config` tree) and interpolates every
/// string leaf in place.
pub fn interpolate_json(
    value: &serde_json::Value,
    scope: &VariableScope,
    mode: ResolutionMode,
) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(interpolate(s, scope, mode)?)),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate_json(item, scope, mode)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate_json(v, scope, mode)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn collect_json_refs(value: &serde_json::Value, out: &mut Vec<VarRef>) {
    match value {
        serde_json::Value::String(s) => out.extend(extract_refs(s)),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_refs(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_json_refs(v, out);
            }
        }
        _ => {}
    }
}

/// Every reference in a step, gathered from `config` (recursively),
/// `env`, `setVariables`, `outputs`, `dependsOn`, and the `when`/`if`/
/// `unless` predicate — the single regex pass SPEC_FULL.md §4.E step 2
/// and §4.G describe. Used to pre-validate `workflow.*` references
/// before a workflow's first step dispatches.
pub fn collect_step_refs(step: &Step) -> Vec<VarRef> {
    let mut refs = Vec::new();
    collect_json_refs(&step.config, &mut refs);
    for v in step.env.values() {
        refs.extend(extract_refs(v));
    }
    for v in step.set_variables.values() {
        refs.extend(extract_refs(v));
    }
    for v in &step.outputs {
        refs.extend(extract_refs(v));
    }
    for v in &step.depends_on {
        refs.extend(extract_refs(v));
    }
    if let Some((expr, _)) = step.predicate() {
        refs.extend(extract_refs(expr));
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_maps() -> (
        HashMap<String, String>,
        HashMap<String, HashMap<String, String>>,
        HashMap<String, HashMap<String, String>>,
        HashMap<String, String>,
    ) {
        (
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn extract_finds_braced_and_bare_refs() {
        let refs = extract_refs("hello ${workflow.name} and $raw_env");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "workflow.name");
        assert_eq!(refs[1].name, "raw_env");
    }

    #[test]
    fn resolves_workflow_prefix() {
        let (mut workflow_vars, step_outputs, resources, step_env) = empty_maps();
        workflow_vars.insert("env".to_string(), "prod".to_string());
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        assert_eq!(scope.resolve("workflow.env"), Some("prod".to_string()));
    }

    #[test]
    fn resolves_resources_prefix() {
        let (workflow_vars, step_outputs, mut resources, step_env) = empty_maps();
        let mut attrs = HashMap::new();
        attrs.insert("ip".to_string(), "10.0.0.5".to_string());
        resources.insert("db".to_string(), attrs);
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        assert_eq!(scope.resolve("resources.db.ip"), Some("10.0.0.5".to_string()));
    }

    #[test]
    fn resolves_dotted_step_output() {
        let (workflow_vars, mut step_outputs, resources, step_env) = empty_maps();
        let mut outputs = HashMap::new();
        outputs.insert("url".to_string(), "https://x".to_string());
        step_outputs.insert("deploy".to_string(), outputs);
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        assert_eq!(scope.resolve("deploy.url"), Some("https://x".to_string()));
    }

    #[test]
    fn resolves_plain_step_env_before_process_env() {
        let (workflow_vars, step_outputs, resources, mut step_env) = empty_maps();
        step_env.insert("HOME".to_string(), "/step-local".to_string());
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        assert_eq!(scope.resolve("HOME"), Some("/step-local".to_string()));
    }

    #[test]
    fn strict_mode_errors_on_unresolved() {
        let (workflow_vars, step_outputs, resources, step_env) = empty_maps();
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        let err = interpolate("${workflow.missing}", &scope, ResolutionMode::Strict).unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: ${workflow.missing}");
    }

    #[test]
    fn lenient_mode_substitutes_empty_string_for_unresolved() {
        let (workflow_vars, step_outputs, resources, step_env) = empty_maps();
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        let result = interpolate("${workflow.missing}", &scope, ResolutionMode::Lenient).unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn empty_braced_reference_is_always_rejected() {
        let (workflow_vars, step_outputs, resources, step_env) = empty_maps();
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        assert!(interpolate("${}", &scope, ResolutionMode::Strict).is_err());
        assert!(interpolate("${}", &scope, ResolutionMode::Lenient).is_err());
    }

    #[test]
    fn collect_step_refs_gathers_config_env_and_predicate() {
        use indexmap::IndexMap;

        let mut env = IndexMap::new();
        env.insert("TOKEN".to_string(), "${workflow.token}".to_string());

        let step = Step {
            name: "deploy".to_string(),
            step_type: "bash".to_string(),
            config: serde_json::json!({"image": "app:${workflow.tag}", "args": ["$RAW"]}),
            env,
            set_variables: IndexMap::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            when: Some("${workflow.enabled}".to_string()),
            if_: None,
            unless: None,
            continue_on_failure: false,
            timeout_seconds: None,
        };

        let names: Vec<String> = collect_step_refs(&step).into_iter().map(|r| r.name).collect();
        assert!(names.contains(&"workflow.tag".to_string()));
        assert!(names.contains(&"RAW".to_string()));
        assert!(names.contains(&"workflow.token".to_string()));
        assert!(names.contains(&"workflow.enabled".to_string()));
    }

    #[test]
    fn interpolate_json_walks_nested_structures() {
        let (mut workflow_vars, step_outputs, resources, step_env) = empty_maps();
        workflow_vars.insert("tag".to_string(), "v1".to_string());
        let scope = VariableScope {
            workflow_vars: &workflow_vars,
            step_outputs: &step_outputs,
            resources: &resources,
            step_env: &step_env,
        };
        let value = serde_json::json!({"image": "app:${workflow.tag}", "args": ["x", "y"]});
        let result = interpolate_json(&value, &scope, ResolutionMode::Strict).unwrap();
        assert_eq!(result["image"], serde_json::json!("app:v1"));
    }
}
