// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! The persistent task record. See SPEC_FULL.md §3 and §4.F.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default priority assigned to a task when the caller does not pick
/// one explicitly. Priority 1 is highest; this sits mid-scale on the
/// 1-10 range until a caller-visible API exposes the choice.
pub const DEFAULT_PRIORITY: i16 = 5;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// One unit of enqueued work: an application/workflow pair plus the
/// bookkeeping fields every backend (in-memory or Postgres) maintains
/// identically. `workflow_payload` is the raw workflow spec (either
/// inline or resolved from a golden path); `identity` is the opaque
/// caller-identity context passed through to provisioners untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: Uuid,
    pub app_name: String,
    pub workflow_name: String,
    pub workflow_payload: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub status: TaskStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub priority: i16,
    pub error_message: Option<String>,
    #[serde(default)]
    pub identity: Option<serde_json::Value>,
}

impl QueueTask {
    /// Builds a fresh, unlocked, `pending` task ready for `enqueue`.
    pub fn new(app_name: impl Into<String>, workflow_name: impl Into<String>, workflow_payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            workflow_name: workflow_name.into(),
            workflow_payload,
            metadata: serde_json::Value::Null,
            status: TaskStatus::Pending,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            locked_by: None,
            locked_at: None,
            lock_expires_at: None,
            heartbeat_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            priority: DEFAULT_PRIORITY,
            error_message: None,
            identity: None,
        }
    }

    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_identity(mut self, identity: serde_json::Value) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults_to_pending_priority_five() {
        let task = QueueTask::new("app", "deploy", serde_json::json!({}));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert_eq!(task.retry_count, 0);
        assert!(task.locked_by.is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed, TaskStatus::Failed] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
    }
}
