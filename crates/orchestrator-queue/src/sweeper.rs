// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Stale-lock sweeper: wakes on `sweep_interval`, resets rows whose
//! lock has expired back to `pending` (bumping `retry_count`), or to
//! terminal `failed` once `retry_count` has reached `max_retries`. See
//! SPEC_FULL.md §4.F.
//!
//! Grounded on `orchestrator_audit::retention::AuditRetentionManager::start_background_cleanup`'s
//! spawn-an-interval-loop shape.

use crate::store::TaskQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Spawns the sweep loop as its own task, returning a handle the
/// caller can abort on shutdown. Runs until aborted; a single failed
/// sweep pass is logged and does not stop the loop.
pub fn spawn_sweeper(queue: Arc<dyn TaskQueue>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match queue.sweep_stale_locks().await {
                Ok(report) => {
                    if !report.requeued.is_empty() || !report.exhausted.is_empty() {
                        debug!(
                            requeued = report.requeued.len(),
                            exhausted = report.exhausted.len(),
                            "stale-lock sweep reclaimed tasks"
                        );
                    }
                    for id in &report.exhausted {
                        warn!(task_id = %id, "task exhausted max_retries, terminal failed");
                    }
                }
                Err(err) => {
                    error!(error = %err, "stale-lock sweep failed");
                }
            }
        }
    })
}
