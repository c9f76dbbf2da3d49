// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Kubernetes object model over the record store.
//!
//! - [`rbac`]: ServiceAccount / RoleBinding / Role views and rule resolution
//! - [`workload`]: Pods and pod-templating controllers
//! - [`object`]: kind-based decode into those views

pub mod object;
pub mod rbac;
pub mod workload;

pub use object::{ObjectKind, TypedObject};
pub use rbac::{get_service_account_by_name, AccessRequest, CanI, Role, RoleBinding, Rule, ServiceAccount};
pub use workload::{find_workloads_by_service_account, workloads, Container, ContainerType, Workload, WorkloadId};
