// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Tamper-evident audit log for workflow, step, golden-path, and queue
//! lifecycle events. Not named as a core module in SPEC_FULL.md, but
//! carried as ambient infrastructure every production deployment of
//! this shape keeps alongside the engine (see DESIGN.md).
//!
//! Every [`models::AuditEvent`] is hash-chained to the one before it
//! ([`models::AuditEvent::compute_hash`]); a storage backend
//! ([`file::FileAuditStorage`] for local/dev, [`database::DatabaseAuditStorage`]
//! behind the `database` feature for production) persists the chain,
//! and [`retention::AuditRetentionManager`] prunes it on a schedule.

pub mod database;
pub mod file;
pub mod logger;
pub mod models;
pub mod retention;
pub mod storage;

pub use logger::AuditLogger;
pub use models::{AuditEvent, AuditEventType, AuditFilter, AuditResult, ResourceType};
pub use storage::{AuditStorage, AuditStorageRef, StorageError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
