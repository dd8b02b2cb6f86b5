// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory `TaskQueue`, the single-replica default backend.
//! See SPEC_FULL.md §4.F.
//!
//! Claim ordering is `(priority ASC, enqueued_at ASC)` — priority 1 is
//! highest and sorts first — matching the Postgres claim statement
//! verbatim; a single `parking_lot::Mutex` plays the role SQL's row
//! lock plays for the database backend, since there is only ever one
//! process sharing this map.

use crate::error::{QueueError, Result};
use crate::metrics::QueueMetrics;
use crate::store::{SweepReport, TaskOutcome, TaskQueue};
use crate::task::{QueueTask, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub struct InMemoryQueue {
    capacity: usize,
    lock_duration: Duration,
    tasks: Mutex<HashMap<Uuid, QueueTask>>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(capacity: usize, lock_duration: Duration) -> Self {
        Self {
            capacity,
            lock_duration,
            tasks: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Resolves once a task may be claimable, or after `timeout` elapses
    /// — the worker loop's poll wakeup. Not part of the `TaskQueue`
    /// trait since only the in-memory backend can push-notify; the
    /// Postgres backend's workers rely on `poll_interval` alone.
    pub async fn wait_for_work(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Whether a task is claimable right now: `pending`, or `running`
    /// with an expired lock, and not yet out of retries.
    fn is_claimable(task: &QueueTask, now: chrono::DateTime<Utc>) -> bool {
        if task.retry_count > task.max_retries {
            return false;
        }
        match task.status {
            TaskStatus::Pending => true,
            TaskStatus::Running => task.lock_expires_at.is_some_and(|exp| exp < now),
            _ => false,
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, task: QueueTask) -> Result<Uuid> {
        let mut tasks = self.tasks.lock();
        let pending = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        if pending >= self.capacity {
            return Err(QueueError::QueueFull(self.capacity));
        }
        let id = task.id;
        tasks.insert(id, task);
        drop(tasks);
        self.notify.notify_one();
        Ok(id)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<QueueTask>> {
        let mut tasks = self.tasks.lock();
        let now = Utc::now();

        let winner = tasks
            .values()
            .filter(|t| Self::is_claimable(t, now))
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
            })
            .map(|t| t.id);

        let Some(id) = winner else {
            return Ok(None);
        };

        let task = tasks.get_mut(&id).expect("winner id came from this map");
        task.status = TaskStatus::Running;
        task.locked_by = Some(worker_id.to_string());
        task.locked_at = Some(now);
        task.lock_expires_at = Some(now + self.lock_duration);
        task.heartbeat_at = Some(now);
        if task.started_at.is_none() {
            task.started_at = Some(now);
        }
        Ok(Some(task.clone()))
    }

    async fn heartbeat(&self, task_id: Uuid, worker_id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&task_id) else {
            return Err(QueueError::TaskNotFound(task_id));
        };
        if task.locked_by.as_deref() != Some(worker_id) {
            // Lock already lost to someone else (or the sweeper); the
            // caller is expected to abort on detecting this at its
            // next heartbeat-driven check, per SPEC_FULL.md §5.
            return Ok(());
        }
        let now = Utc::now();
        task.heartbeat_at = Some(now);
        task.lock_expires_at = Some(now + self.lock_duration);
        Ok(())
    }

    async fn report_outcome(&self, task_id: Uuid, worker_id: &str, outcome: TaskOutcome) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&task_id) else {
            return Err(QueueError::TaskNotFound(task_id));
        };
        if task.locked_by.as_deref() != Some(worker_id) {
            return Err(QueueError::ClaimConflict(task_id));
        }

        let now = Utc::now();
        task.locked_by = None;
        task.lock_expires_at = None;
        task.heartbeat_at = None;

        match outcome {
            TaskOutcome::Completed(result) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(now);
                task.error_message = None;
                merge_result(task, result);
            }
            TaskOutcome::Failed { message, retriable } => {
                task.error_message = Some(message);
                task.completed_at = Some(now);
                if !retriable {
                    task.retry_count = task.max_retries + 1;
                }
                task.status = TaskStatus::Failed;
            }
        }
        Ok(())
    }

    async fn sweep_stale_locks(&self) -> Result<SweepReport> {
        let mut tasks = self.tasks.lock();
        let now = Utc::now();
        let mut report = SweepReport::default();

        for task in tasks.values_mut() {
            let stale_running = task.status == TaskStatus::Running
                && task.lock_expires_at.is_some_and(|exp| exp < now);
            let retriable_failure = task.status == TaskStatus::Failed && task.retry_count <= task.max_retries;

            if !stale_running && !retriable_failure {
                continue;
            }

            if task.retry_count < task.max_retries {
                task.retry_count += 1;
                task.status = TaskStatus::Pending;
                task.locked_by = None;
                task.lock_expires_at = None;
                task.heartbeat_at = None;
                task.completed_at = None;
                report.requeued.push(task.id);
            } else {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                report.exhausted.push(task.id);
            }
        }

        if !report.requeued.is_empty() {
            drop(tasks);
            self.notify.notify_waiters();
        }

        Ok(report)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<QueueTask>> {
        Ok(self.tasks.lock().get(&task_id).cloned())
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        let tasks = self.tasks.lock();
        let mut m = QueueMetrics::default();
        let mut queue_time_total_ms = 0u64;
        let mut queue_time_count = 0u64;
        let mut exec_time_total_ms = 0u64;
        let mut exec_time_count = 0u64;

        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => m.depth += 1,
                TaskStatus::Running => m.running += 1,
                TaskStatus::Completed => m.completed += 1,
                TaskStatus::Failed => {
                    if task.retry_count > task.max_retries {
                        m.failed += 1;
                    } else {
                        m.depth += 1; // awaiting the sweeper's requeue decision
                    }
                }
            }
            if let Some(started) = task.started_at {
                queue_time_total_ms += (started - task.enqueued_at).num_milliseconds().max(0) as u64;
                queue_time_count += 1;
            }
            if let (Some(started), Some(completed)) = (task.started_at, task.completed_at) {
                exec_time_total_ms += (completed - started).num_milliseconds().max(0) as u64;
                exec_time_count += 1;
            }
        }

        m.avg_queue_time_ms = avg(queue_time_total_ms, queue_time_count);
        m.avg_execution_time_ms = avg(exec_time_total_ms, exec_time_count);
        Ok(m)
    }
}

fn avg(total_ms: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_ms as f64 / count as f64
    }
}

fn merge_result(task: &mut QueueTask, result: serde_json::Value) {
    let mut metadata = task.metadata.clone();
    if !metadata.is_object() {
        metadata = serde_json::json!({});
    }
    metadata["result"] = result;
    task.metadata = metadata;
}
