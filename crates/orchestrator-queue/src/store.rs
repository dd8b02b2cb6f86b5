// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! The `TaskQueue` trait both backends implement. See SPEC_FULL.md §4.F.

use crate::error::Result;
use crate::metrics::QueueMetrics;
use crate::task::QueueTask;
use async_trait::async_trait;
use uuid::Uuid;

/// How a worker reports the outcome of one task attempt back to the
/// queue. The queue — not the executor — decides whether a `Failed`
/// outcome gets retried; see SPEC_FULL.md §4.E "Failure semantics".
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(serde_json::Value),
    /// `retriable = false` forces the task straight to terminal
    /// `failed` regardless of `retry_count` (a `FatalStepError`).
    Failed { message: String, retriable: bool },
}

/// The result of one stale-lock sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Task ids reset from `running` to `pending` with `retry_count` incremented.
    pub requeued: Vec<Uuid>,
    /// Task ids that had exhausted `max_retries` and were marked terminal `failed`.
    pub exhausted: Vec<Uuid>,
}

/// Durable task queue contract shared by the in-memory (single-replica)
/// and Postgres-backed (multi-replica) implementations. Every method is
/// safe to call from any number of concurrent workers.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a new task. Non-blocking; returns `QueueError::QueueFull`
    /// if the backend enforces a bounded capacity and is at it.
    async fn enqueue(&self, task: QueueTask) -> Result<Uuid>;

    /// Atomically claims the highest-priority, oldest-enqueued pending
    /// (or stale-locked) task for `worker_id`. Returns `None` if no task
    /// is claimable right now. Two concurrent callers must never
    /// receive the same task id from this method — see SPEC_FULL.md §8
    /// "exactly-once claim".
    async fn claim(&self, worker_id: &str) -> Result<Option<QueueTask>>;

    /// Extends `lock_expires_at` and updates `heartbeat_at` for a task
    /// still owned by `worker_id`. A no-op (not an error) if the lock
    /// was already lost — the caller detects loss via `get`.
    async fn heartbeat(&self, task_id: Uuid, worker_id: &str) -> Result<()>;

    /// Records the terminal or retriable outcome of one attempt.
    async fn report_outcome(&self, task_id: Uuid, worker_id: &str, outcome: TaskOutcome) -> Result<()>;

    /// Resets rows whose lock has expired back to `pending` (bumping
    /// `retry_count`), or to terminal `failed` once `retry_count` has
    /// reached `max_retries`. Called by the sweeper on an interval.
    async fn sweep_stale_locks(&self) -> Result<SweepReport>;

    async fn get(&self, task_id: Uuid) -> Result<Option<QueueTask>>;

    async fn metrics(&self) -> Result<QueueMetrics>;
}
