// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the durable task queue. See SPEC_FULL.md §4.F.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The in-memory queue is at its configured capacity.
    #[error("queue is full (capacity {0})")]
    QueueFull(usize),

    /// No task with this id exists, or it was claimed by someone else.
    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// A claim raced another worker and lost; the caller should poll again.
    #[error("lost claim race for task {0}")]
    ClaimConflict(uuid::Uuid),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] orchestrator_core::error::OrchestratorError),
}

impl QueueError {
    /// Whether the sweeper should retry a task that failed with this
    /// error, mirroring `OrchestratorError::is_retriable`.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ClaimConflict(_))
    }
}
