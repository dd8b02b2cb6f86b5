// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Typed validation of golden-path parameters with defaults merging.
//!
//! See SPEC_FULL.md §4.A. This module owns the full parameter type
//! system: `string`, `int`, `bool`, `duration`, `enum`, plus the
//! duration grammar extensions (`d`, `w`) and boolean token set the
//! spec requires.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The closed set of golden-path parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Bool,
    Duration,
    Enum,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::Duration => "duration",
            ParamType::Enum => "enum",
        }
    }
}

/// A typed parameter definition attached to a golden path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default, rename = "allowedValues")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl ParameterSchema {
    /// Convenience constructor for the legacy required/optional string
    /// shorthand used by golden-path files that predate typed schemas.
    pub fn legacy_string(required: bool, default: Option<String>) -> Self {
        Self {
            param_type: ParamType::String,
            default,
            required,
            description: String::new(),
            pattern: None,
            allowed_values: None,
            min: None,
            max: None,
        }
    }

    /// Schema-level invariants: `allowedValues` must be non-empty for
    /// `enum`; `min`/`max` only meaningful for `int`; `pattern` only for
    /// `string`/`duration`.
    fn check_schema_invariants(&self, name: &str) -> Result<(), ValidationError> {
        if matches!(self.param_type, ParamType::Enum)
            && self.allowed_values.as_ref().map(|v| v.is_empty()).unwrap_or(true)
        {
            return Err(ValidationError {
                param_name: name.to_string(),
                provided_value: String::new(),
                expected_type: self.param_type.as_str().to_string(),
                constraint: "enum parameter schema must declare non-empty allowedValues"
                    .to_string(),
                suggestion: None,
            });
        }
        Ok(())
    }
}

/// Parse a Go-style duration with the spec's `d` (day) and `w` (week)
/// extensions. Negative durations are rejected: every numeric component
/// of the grammar is unsigned, so a leading `-` is simply an invalid
/// token, which is the policy this implementation settles on (see
/// DESIGN.md).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static TOKEN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)(ns|us|ms|s|m|h|d|w)").unwrap());

    if raw.is_empty() {
        return Err("invalid duration format".to_string());
    }

    let mut total_ns: u128 = 0;
    let mut consumed = 0usize;
    for caps in TOKEN_RE.captures_iter(raw) {
        let whole = caps.get(0).unwrap();
        // Reject gaps: every byte of `raw` must belong to some token,
        // otherwise stray characters like the 'x' in "2x" would be
        // silently ignored instead of rejected.
        if whole.start() != consumed {
            return Err("invalid duration format".to_string());
        }
        consumed = whole.end();

        let n: u128 = caps[1].parse().map_err(|_| "invalid duration format".to_string())?;
        let unit_ns: u128 = match &caps[2] {
            "ns" => 1,
            "us" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "d" => 24 * 3_600 * 1_000_000_000,
            "w" => 168 * 3_600 * 1_000_000_000,
            _ => unreachable!(),
        };
        total_ns = total_ns.saturating_add(n.saturating_mul(unit_ns));
    }

    if consumed != raw.len() || consumed == 0 {
        return Err("invalid duration format".to_string());
    }

    let secs = (total_ns / 1_000_000_000) as u64;
    let nanos = (total_ns % 1_000_000_000) as u32;
    Ok(Duration::new(secs, nanos))
}

const BOOL_TRUE_TOKENS: &[&str] = &["true", "yes", "1", "on"];
const BOOL_FALSE_TOKENS: &[&str] = &["false", "no", "0", "off"];

fn parse_bool_token(raw: &str) -> Option<bool> {
    let lower = raw.to_ascii_lowercase();
    if BOOL_TRUE_TOKENS.contains(&lower.as_str()) {
        Some(true)
    } else if BOOL_FALSE_TOKENS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Validates a single raw parameter value against its schema, returning
/// the normalised string representation (booleans become `"true"`/`"false"`)
/// or a rich [`ValidationError`].
pub fn validate(
    param_name: &str,
    raw_value: &str,
    schema: &ParameterSchema,
) -> Result<String, ValidationError> {
    schema.check_schema_invariants(param_name)?;

    if raw_value.is_empty() {
        if schema.required {
            return Err(ValidationError {
                param_name: param_name.to_string(),
                provided_value: raw_value.to_string(),
                expected_type: schema.param_type.as_str().to_string(),
                constraint: "parameter is required".to_string(),
                suggestion: None,
            });
        }
        return Ok(String::new());
    }

    match schema.param_type {
        ParamType::String => {
            if let Some(pattern) = &schema.pattern {
                let re = regex::Regex::new(pattern).map_err(|e| ValidationError {
                    param_name: param_name.to_string(),
                    provided_value: raw_value.to_string(),
                    expected_type: "string".to_string(),
                    constraint: format!("schema pattern is not a valid regex: {e}"),
                    suggestion: None,
                })?;
                if !re.is_match(raw_value) {
                    return Err(ValidationError {
                        param_name: param_name.to_string(),
                        provided_value: raw_value.to_string(),
                        expected_type: "string".to_string(),
                        constraint: format!("does not match required pattern '{pattern}'"),
                        suggestion: None,
                    });
                }
            }
            if let Some(allowed) = &schema.allowed_values {
                if !allowed.is_empty() && !allowed.iter().any(|v| v == raw_value) {
                    return Err(ValidationError {
                        param_name: param_name.to_string(),
                        provided_value: raw_value.to_string(),
                        expected_type: "string".to_string(),
                        constraint: format!("must be one of: {}", allowed.join(", ")),
                        suggestion: None,
                    });
                }
            }
            Ok(raw_value.to_string())
        }
        ParamType::Int => {
            let n: i64 = raw_value.parse().map_err(|_| ValidationError {
                param_name: param_name.to_string(),
                provided_value: raw_value.to_string(),
                expected_type: "int".to_string(),
                constraint: "invalid integer format".to_string(),
                suggestion: Some("provide a signed integer, e.g. 42".to_string()),
            })?;
            if let Some(min) = schema.min {
                if n < min {
                    return Err(ValidationError {
                        param_name: param_name.to_string(),
                        provided_value: raw_value.to_string(),
                        expected_type: "int".to_string(),
                        constraint: format!("must be >= {min}"),
                        suggestion: None,
                    });
                }
            }
            if let Some(max) = schema.max {
                if n > max {
                    return Err(ValidationError {
                        param_name: param_name.to_string(),
                        provided_value: raw_value.to_string(),
                        expected_type: "int".to_string(),
                        constraint: format!("must be <= {max}"),
                        suggestion: None,
                    });
                }
            }
            Ok(n.to_string())
        }
        ParamType::Bool => match parse_bool_token(raw_value) {
            Some(b) => Ok(b.to_string()),
            None => Err(ValidationError {
                param_name: param_name.to_string(),
                provided_value: raw_value.to_string(),
                expected_type: "bool".to_string(),
                constraint: "invalid boolean format".to_string(),
                suggestion: Some(
                    "use one of: true, false, yes, no, 1, 0, on, off".to_string(),
                ),
            }),
        },
        ParamType::Duration => {
            parse_duration(raw_value).map(|_| raw_value.to_string()).map_err(|_| {
                ValidationError {
                    param_name: param_name.to_string(),
                    provided_value: raw_value.to_string(),
                    expected_type: "duration".to_string(),
                    constraint: "invalid duration format".to_string(),
                    suggestion: Some("use format like: 2h, 30m, 90s, 7d".to_string()),
                }
            })
        }
        ParamType::Enum => {
            let allowed = schema.allowed_values.as_ref().expect("checked above");
            if allowed.iter().any(|v| v == raw_value) {
                Ok(raw_value.to_string())
            } else {
                Err(ValidationError {
                    param_name: param_name.to_string(),
                    provided_value: raw_value.to_string(),
                    expected_type: "enum".to_string(),
                    constraint: format!("must be one of: {}", allowed.join(", ")),
                    suggestion: None,
                })
            }
        }
    }
}

/// Merges user-supplied parameters with a golden path's schemas: required
/// parameters must be present (or have a default), optional parameters
/// fall back to their schema default, and unknown user keys pass through
/// unchanged. Fails fast on the first invalid parameter.
pub fn merge_with_defaults(
    schemas: &HashMap<String, ParameterSchema>,
    user_params: &HashMap<String, String>,
) -> Result<HashMap<String, String>, ValidationError> {
    let mut resolved = HashMap::new();

    let mut names: Vec<&String> = schemas.keys().collect();
    names.sort();

    for name in names {
        let schema = &schemas[name];
        let raw = user_params
            .get(name)
            .cloned()
            .or_else(|| schema.default.clone())
            .unwrap_or_default();
        let value = validate(name, &raw, schema)?;
        resolved.insert(name.clone(), value);
    }

    for (key, value) in user_params {
        if !schemas.contains_key(key) {
            resolved.insert(key.clone(), value.clone());
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(t: ParamType) -> ParameterSchema {
        ParameterSchema {
            param_type: t,
            default: None,
            required: true,
            description: String::new(),
            pattern: None,
            allowed_values: None,
            min: None,
            max: None,
        }
    }

    #[test]
    fn int_bounds_inclusive() {
        let mut s = schema(ParamType::Int);
        s.min = Some(1);
        s.max = Some(10);
        assert!(validate("n", "1", &s).is_ok());
        assert!(validate("n", "10", &s).is_ok());
        assert!(validate("n", "0", &s).is_err());
        assert!(validate("n", "11", &s).is_err());
    }

    #[test]
    fn bool_tokens_normalise() {
        let s = schema(ParamType::Bool);
        assert_eq!(validate("b", "YES", &s).unwrap(), "true");
        assert_eq!(validate("b", "Off", &s).unwrap(), "false");
        assert!(validate("b", "maybe", &s).is_err());
    }

    #[test]
    fn duration_rejects_unknown_unit() {
        let s = schema(ParamType::Duration);
        let err = validate("ttl", "2x", &s).unwrap_err();
        assert_eq!(err.expected_type, "duration");
        assert!(err.suggestion.unwrap().contains("2h"));
    }

    #[test]
    fn duration_accepts_zero_and_combined_forms() {
        assert_eq!(parse_duration("0s").unwrap(), Duration::from_secs(0));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(7 * 86400));
        assert_eq!(parse_duration("2w").unwrap(), Duration::from_secs(2 * 168 * 3600));
    }

    #[test]
    fn duration_rejects_negative() {
        assert!(parse_duration("-1h").is_err());
    }

    #[test]
    fn enum_requires_allowed_values() {
        let s = schema(ParamType::Enum);
        let err = validate("env", "prod", &s).unwrap_err();
        assert!(err.constraint.contains("allowedValues"));
    }

    #[test]
    fn empty_optional_is_accepted_empty_required_errors() {
        let mut s = schema(ParamType::String);
        s.required = false;
        assert_eq!(validate("x", "", &s).unwrap(), "");

        s.required = true;
        let err = validate("x", "", &s).unwrap_err();
        assert_eq!(err.constraint, "parameter is required");
    }

    #[test]
    fn merge_with_defaults_is_idempotent() {
        let mut schemas = HashMap::new();
        schemas.insert(
            "sync_policy".to_string(),
            ParameterSchema {
                param_type: ParamType::String,
                default: Some("auto".to_string()),
                required: false,
                description: String::new(),
                pattern: None,
                allowed_values: None,
                min: None,
                max: None,
            },
        );
        let user = HashMap::new();
        let once = merge_with_defaults(&schemas, &user).unwrap();
        let twice = merge_with_defaults(&schemas, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_with_defaults_passes_through_unknown_keys() {
        let schemas = HashMap::new();
        let mut user = HashMap::new();
        user.insert("extra".to_string(), "value".to_string());
        let resolved = merge_with_defaults(&schemas, &user).unwrap();
        assert_eq!(resolved.get("extra").unwrap(), "value");
    }
}
