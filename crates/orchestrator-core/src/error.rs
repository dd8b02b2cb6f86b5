// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the orchestration core.
//!
//! Every variant here maps to one of the error kinds in the design
//! document: `Validation` and `Configuration` are surfaced to the caller
//! before a task ever reaches the queue; `Transient`/`Concurrency` are
//! retried by the queue's sweeper; `FatalStep` forces a task straight to
//! terminal `failed`; `Contract` indicates a bug and is never retried.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// A single parameter validation failure, carrying everything a caller
/// needs to fix their input.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub param_name: String,
    pub provided_value: String,
    pub expected_type: String,
    pub constraint: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "parameter '{}' validation failed: provided value '{}', {}",
            self.param_name, self.provided_value, self.constraint
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, ". Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Golden-path parameter or reference-extractor validation failure.
    /// Task never enters the queue.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Missing workflow file, unknown step type, manifest incompatibility.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provisioner I/O, network, or database contention. Retried by the
    /// queue's sweeper up to `maxRetries`.
    #[error("transient error: {0}")]
    Transient(String),

    /// Provisioner signalled "do not retry". Transitions straight to
    /// terminal `failed`.
    #[error("fatal step error: {0}")]
    FatalStep(String),

    /// Lost lock or cancellation. Treated as transient by the queue.
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Illegal state transition, duplicate registration. Never retried;
    /// indicates a bug in the caller or the core itself.
    #[error("contract violation: {0}")]
    Contract(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("no provisioner for type '{0}'")]
    ProvisionerNotFound(String),

    #[error("golden path not found: {0}")]
    GoldenPathNotFound(String),

    #[error("invalid step config for '{step_id}': {reason}")]
    InvalidStepConfig { step_id: String, reason: String },

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("step '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("cycle detected in graph: {0}")]
    Cycle(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the queue's sweeper should retry a task that failed with
    /// this error, per the taxonomy in the design document.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Concurrency(_))
    }
}
