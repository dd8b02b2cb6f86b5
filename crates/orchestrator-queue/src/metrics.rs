// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Queue-observed metrics (SPEC_FULL.md §4.F). In multi-replica mode
//! these MUST be computed from the persistent store, never from
//! process-local counters — `PostgresQueue::metrics` runs aggregate
//! queries; `InMemoryQueue::metrics` reads its own guarded state, which
//! is authoritative only because single-replica mode has exactly one
//! process.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub depth: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub avg_queue_time_ms: f64,
    pub avg_execution_time_ms: f64,
}
