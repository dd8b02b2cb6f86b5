// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Durable task queue: a bounded in-memory single-replica backend and a
//! Postgres-backed multi-replica target sharing one claim/heartbeat/sweep
//! contract. See SPEC_FULL.md §4.F.

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
#[cfg(feature = "database")]
pub mod postgres;
pub mod store;
pub mod sweeper;
pub mod task;
pub mod worker;

pub use config::{QueueBackend, QueueConfig};
pub use error::{QueueError, Result};
pub use store::{SweepReport, TaskOutcome, TaskQueue};
pub use task::{QueueTask, TaskStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the configured [`TaskQueue`] backend from a [`QueueConfig`].
/// The `database` feature must be enabled and `database_url` set to
/// pick [`QueueBackend::Postgres`]; this mirrors the "read once at
/// startup" rule in SPEC_FULL.md §10 — callers build one queue instance
/// and keep it for the process lifetime.
pub async fn build_queue(config: &QueueConfig) -> Result<std::sync::Arc<dyn TaskQueue>> {
    match config.backend {
        QueueBackend::Memory => Ok(std::sync::Arc::new(memory::InMemoryQueue::new(
            config.capacity,
            config.lock_duration,
        ))),
        #[cfg(feature = "database")]
        QueueBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                error::QueueError::Configuration("QUEUE_BACKEND=postgres requires DATABASE_URL".to_string())
            })?;
            let queue = postgres::PostgresQueue::new(url, config.lock_duration).await?;
            queue.migrate().await?;
            Ok(std::sync::Arc::new(queue))
        }
        #[cfg(not(feature = "database"))]
        QueueBackend::Postgres => Err(error::QueueError::Configuration(
            "QUEUE_BACKEND=postgres requires the `database` feature".to_string(),
        )),
    }
}
