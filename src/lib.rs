// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! ep-scan: offline Kubernetes RBAC evaluation and excessive-permission detection.
//!
//! Manifests are loaded into a [`store::RecordStore`], resolved through the
//! RBAC views in [`k8s`], expanded into concrete permissions against the
//! [`perm`] catalogs and compared with observed behavior in [`analyse`].

pub mod analyse;
pub mod config;
pub mod context;
pub mod error;
pub mod issue;
pub mod k8s;
pub mod logging;
pub mod perm;
pub mod project;
pub mod store;

pub use context::PolicyContext;
pub use error::{PolicyError, PolicyResult};
pub use issue::{Issue, Rule};
pub use store::RecordStore;
