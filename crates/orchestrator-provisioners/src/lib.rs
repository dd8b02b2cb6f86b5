// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Built-in provisioners: `bash`, `http`, `gitops-commit`, and `noop`,
//! all implementing `orchestrator_core::provisioner::Provisioner`. See
//! SPEC_FULL.md §2 and §4.C.

pub mod adapter;
pub mod bash;
pub mod gitops;
pub mod http;
pub mod noop;

pub use adapter::LegacyProvisionerAdapter;
pub use bash::BashProvisioner;
pub use gitops::GitOpsCommitProvisioner;
pub use http::HttpProvisioner;
pub use noop::NoopProvisioner;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
