// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Postgres-backed `TaskQueue`, safe for multiple replicas sharing one
//! database. See SPEC_FULL.md §4.F and §8 ("exactly-once claim").
//!
//! Pool setup and migration style mirror
//! `orchestrator_audit::database::DatabaseAuditStorage`. Claiming is a
//! single `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED)
//! RETURNING *` statement so two replicas racing on the same row never
//! both win: Postgres's row lock makes the claim atomic without an
//! application-level mutex.

#![cfg(feature = "database")]

use crate::error::{QueueError, Result};
use crate::metrics::QueueMetrics;
use crate::store::{SweepReport, TaskOutcome, TaskQueue};
use crate::task::{QueueTask, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

pub struct PostgresQueue {
    pool: PgPool,
    lock_duration: Duration,
}

impl PostgresQueue {
    pub async fn new(database_url: &str, lock_duration: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(5)
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;
        Ok(Self { pool, lock_duration })
    }

    pub fn with_pool(pool: PgPool, lock_duration: Duration) -> Self {
        Self { pool, lock_duration }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_tasks (
                id UUID PRIMARY KEY,
                app_name VARCHAR(255) NOT NULL,
                workflow_name VARCHAR(255) NOT NULL,
                workflow_payload JSONB NOT NULL,
                metadata JSONB,
                status VARCHAR(20) NOT NULL,
                enqueued_at TIMESTAMP WITH TIME ZONE NOT NULL,
                started_at TIMESTAMP WITH TIME ZONE,
                completed_at TIMESTAMP WITH TIME ZONE,
                locked_by VARCHAR(255),
                locked_at TIMESTAMP WITH TIME ZONE,
                lock_expires_at TIMESTAMP WITH TIME ZONE,
                heartbeat_at TIMESTAMP WITH TIME ZONE,
                retry_count INT NOT NULL DEFAULT 0,
                max_retries INT NOT NULL DEFAULT 3,
                priority SMALLINT NOT NULL DEFAULT 5,
                error_message TEXT,
                identity JSONB
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_claimable ON queue_tasks(status, priority, enqueued_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_lock_expiry ON queue_tasks(status, lock_expires_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_app ON queue_tasks(app_name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> sqlx::Result<QueueTask> {
        let status_str: String = row.try_get("status")?;
        Ok(QueueTask {
            id: row.try_get("id")?,
            app_name: row.try_get("app_name")?,
            workflow_name: row.try_get("workflow_name")?,
            workflow_payload: row.try_get("workflow_payload")?,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")?
                .unwrap_or(serde_json::Value::Null),
            status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Pending),
            enqueued_at: row.try_get("enqueued_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            locked_by: row.try_get("locked_by")?,
            locked_at: row.try_get("locked_at")?,
            lock_expires_at: row.try_get("lock_expires_at")?,
            heartbeat_at: row.try_get("heartbeat_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            priority: row.try_get("priority")?,
            error_message: row.try_get("error_message")?,
            identity: row.try_get("identity")?,
        })
    }
}

#[async_trait]
impl TaskQueue for PostgresQueue {
    async fn enqueue(&self, task: QueueTask) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO queue_tasks (
                id, app_name, workflow_name, workflow_payload, metadata, status,
                enqueued_at, retry_count, max_retries, priority, identity
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task.id)
        .bind(&task.app_name)
        .bind(&task.workflow_name)
        .bind(&task.workflow_payload)
        .bind(&task.metadata)
        .bind(task.status.as_str())
        .bind(task.enqueued_at)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .bind(task.priority)
        .bind(&task.identity)
        .execute(&self.pool)
        .await?;
        Ok(task.id)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<QueueTask>> {
        let now = Utc::now();
        let lock_expires_at = now + self.lock_duration;

        let row = sqlx::query(
            r#"
            UPDATE queue_tasks
            SET status = 'running',
                locked_by = $1,
                locked_at = $2,
                lock_expires_at = $3,
                heartbeat_at = $2,
                started_at = COALESCE(started_at, $2)
            WHERE id = (
                SELECT id FROM queue_tasks
                WHERE retry_count <= max_retries
                  AND (
                    status = 'pending'
                    OR (status = 'running' AND lock_expires_at < $2)
                  )
                ORDER BY priority ASC, enqueued_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(lock_expires_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_task(&r).map_err(QueueError::from))
            .transpose()
    }

    async fn heartbeat(&self, task_id: Uuid, worker_id: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE queue_tasks
            SET heartbeat_at = $1, lock_expires_at = $2
            WHERE id = $3 AND locked_by = $4
            "#,
        )
        .bind(now)
        .bind(now + self.lock_duration)
        .bind(task_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn report_outcome(&self, task_id: Uuid, worker_id: &str, outcome: TaskOutcome) -> Result<()> {
        let now = Utc::now();
        let result = match outcome {
            TaskOutcome::Completed(value) => {
                sqlx::query(
                    r#"
                    UPDATE queue_tasks
                    SET status = 'completed',
                        completed_at = $1,
                        error_message = NULL,
                        locked_by = NULL, lock_expires_at = NULL, heartbeat_at = NULL,
                        metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('result', $2::jsonb)
                    WHERE id = $3 AND locked_by = $4
                    "#,
                )
                .bind(now)
                .bind(value)
                .bind(task_id)
                .bind(worker_id)
                .execute(&self.pool)
                .await
            }
            TaskOutcome::Failed { message, retriable } => {
                sqlx::query(
                    r#"
                    UPDATE queue_tasks
                    SET status = 'failed',
                        completed_at = $1,
                        error_message = $2,
                        retry_count = CASE WHEN $3 THEN retry_count ELSE max_retries + 1 END,
                        locked_by = NULL, lock_expires_at = NULL, heartbeat_at = NULL
                    WHERE id = $4 AND locked_by = $5
                    "#,
                )
                .bind(now)
                .bind(message)
                .bind(retriable)
                .bind(task_id)
                .bind(worker_id)
                .execute(&self.pool)
                .await
            }
        }?;

        if result.rows_affected() == 0 {
            return Err(QueueError::ClaimConflict(task_id));
        }
        Ok(())
    }

    async fn sweep_stale_locks(&self) -> Result<SweepReport> {
        let now = Utc::now();

        let requeued: Vec<Uuid> = sqlx::query(
            r#"
            UPDATE queue_tasks
            SET status = 'pending', retry_count = retry_count + 1,
                locked_by = NULL, lock_expires_at = NULL, heartbeat_at = NULL, completed_at = NULL
            WHERE retry_count < max_retries
              AND (
                (status = 'running' AND lock_expires_at < $1)
                OR (status = 'failed' AND retry_count <= max_retries)
              )
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| r.get::<Uuid, _>("id"))
        .collect();

        let exhausted: Vec<Uuid> = sqlx::query(
            r#"
            UPDATE queue_tasks
            SET status = 'failed', completed_at = $1,
                locked_by = NULL, lock_expires_at = NULL, heartbeat_at = NULL
            WHERE retry_count >= max_retries
              AND (
                (status = 'running' AND lock_expires_at < $1)
                OR (status = 'failed' AND completed_at IS NULL)
              )
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| r.get::<Uuid, _>("id"))
        .collect();

        Ok(SweepReport { requeued, exhausted })
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<QueueTask>> {
        let row = sqlx::query("SELECT * FROM queue_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_task(&r).map_err(QueueError::from))
            .transpose()
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS depth,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed' AND retry_count > max_retries) AS failed,
                AVG(EXTRACT(EPOCH FROM (started_at - enqueued_at)) * 1000) FILTER (WHERE started_at IS NOT NULL) AS avg_queue_ms,
                AVG(EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000) FILTER (WHERE completed_at IS NOT NULL AND started_at IS NOT NULL) AS avg_exec_ms
            FROM queue_tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueMetrics {
            depth: row.try_get::<i64, _>("depth").unwrap_or(0) as u64,
            running: row.try_get::<i64, _>("running").unwrap_or(0) as u64,
            completed: row.try_get::<i64, _>("completed").unwrap_or(0) as u64,
            failed: row.try_get::<i64, _>("failed").unwrap_or(0) as u64,
            avg_queue_time_ms: row.try_get::<Option<f64>, _>("avg_queue_ms").ok().flatten().unwrap_or(0.0),
            avg_execution_time_ms: row.try_get::<Option<f64>, _>("avg_exec_ms").ok().flatten().unwrap_or(0.0),
        })
    }
}
