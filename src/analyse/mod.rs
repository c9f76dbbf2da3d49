// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Excessive-permission analysis.
//!
//! The configuration side ([`config`]) enumerates what each workload's service
//! account is granted, the behavior side ([`callsite`]) turns observed API call
//! sites into what each workload actually uses, and [`compare`] reports the
//! sensitive difference.

pub mod callsite;
pub mod compare;
pub mod config;

use crate::k8s::Workload;
use crate::perm::EPScanPermission;

pub use callsite::{load_behavior, match_callsites, read_callsites, read_matched_pods, CallSite, PodMatch};
pub use compare::PermComparer;
pub use config::{list_all_perms, WorkloadPermAnalyser};

/// A workload together with one side's permission set.
#[derive(Debug, Clone)]
pub struct WorkloadPerms<'s> {
    pub workload: Workload<'s>,
    pub perms: Vec<EPScanPermission>,
}

impl<'s> WorkloadPerms<'s> {
    pub fn new(workload: Workload<'s>, perms: Vec<EPScanPermission>) -> Self {
        Self { workload, perms }
    }
}
