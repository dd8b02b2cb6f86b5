// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven queue configuration. Read once at startup, per
//! SPEC_FULL.md §10 — nothing here is hot-reloaded.

use std::time::Duration;

/// Which `TaskQueue` backend a deployment runs. A startup choice, never
/// a compile-time-only decision (SPEC_FULL.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Bounded in-memory queue, single replica.
    Memory,
    /// Postgres-backed queue, safe for multiple replicas.
    Postgres,
}

impl QueueBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "postgres" | "database" | "db" => Some(Self::Postgres),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub workers: usize,
    pub capacity: usize,
    pub poll_interval: Duration,
    pub lock_duration: Duration,
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub strict_validation: bool,
    pub database_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            workers: 5,
            capacity: 100,
            poll_interval: Duration::from_secs(1),
            lock_duration: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            strict_validation: true,
            database_url: None,
        }
    }
}

impl QueueConfig {
    /// Reads the queue configuration from the process environment,
    /// falling back to the documented defaults for anything unset or
    /// unparseable. Matches the env var names in SPEC_FULL.md §6/§10:
    /// `STRICT_VALIDATION`, `QUEUE_WORKERS`, `QUEUE_POLL_INTERVAL`,
    /// `QUEUE_LOCK_DURATION`, `QUEUE_BACKEND`, `DATABASE_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|v| QueueBackend::parse(&v))
                .unwrap_or(defaults.backend),
            workers: env_usize("QUEUE_WORKERS").unwrap_or(defaults.workers),
            capacity: env_usize("QUEUE_CAPACITY").unwrap_or(defaults.capacity),
            poll_interval: env_secs("QUEUE_POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            lock_duration: env_secs("QUEUE_LOCK_DURATION").unwrap_or(defaults.lock_duration),
            heartbeat_interval: env_secs("QUEUE_HEARTBEAT_INTERVAL")
                .unwrap_or(defaults.heartbeat_interval),
            sweep_interval: env_secs("QUEUE_SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            strict_validation: std::env::var("STRICT_VALIDATION")
                .ok()
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(defaults.strict_validation),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.workers, 5);
        assert_eq!(cfg.capacity, 100);
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.lock_duration, Duration::from_secs(300));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert!(cfg.strict_validation);
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!(QueueBackend::parse("Memory"), Some(QueueBackend::Memory));
        assert_eq!(QueueBackend::parse("POSTGRES"), Some(QueueBackend::Postgres));
        assert_eq!(QueueBackend::parse("bogus"), None);
    }
}
