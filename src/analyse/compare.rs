// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Excessive-permission comparison.
//!
//! For every workload, the permissions granted by configuration (left) are
//! diffed against those its code exercises (right) on the `(resource, verb)`
//! key. A granted-but-unused permission is reported only when it is sensitive
//! and held broadly enough to exploit.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::analyse::WorkloadPerms;
use crate::issue::{Issue, RULE_EXCESSIVE_PERMISSIONS};
use crate::k8s::workload::WorkloadId;
use crate::perm::{EPScanPermission, PermissionKey, SensitiveCatalog};

pub struct PermComparer<'a, 's> {
    left: &'a [WorkloadPerms<'s>],
    right: &'a [WorkloadPerms<'s>],
    sensitive: &'a SensitiveCatalog,
}

impl<'a, 's> PermComparer<'a, 's> {
    pub fn new(left: &'a [WorkloadPerms<'s>], right: &'a [WorkloadPerms<'s>], sensitive: &'a SensitiveCatalog) -> Self {
        Self { left, right, sensitive }
    }

    /// One issue per workload holding exploitable excess permissions, in
    /// left-side order. Reasons are sorted, so equal inputs give equal output.
    pub fn scan_ep(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for (left, right) in self.align() {
            let workload = &left.workload;
            let right_keys = right.map(|r| perm_keys(&r.perms)).unwrap_or_default();

            let exploitable: BTreeSet<&EPScanPermission> = left
                .perms
                .iter()
                .filter(|perm| !right_keys.contains(&perm.key()))
                .filter(|perm| {
                    self.sensitive
                        .lookup(&perm.key())
                        .is_some_and(|sensitive| perm.covers(sensitive))
                })
                .collect();

            if exploitable.is_empty() {
                continue;
            }

            let mut issue = Issue::new(RULE_EXCESSIVE_PERMISSIONS)
                .case_of(format!("{} have EP vulnerability", workload.kind()))
                .object(workload.record());
            for perm in exploitable {
                let mut reason = format!("Pod: {} {}, PERM: {}", workload.kind(), workload.name(), perm);
                if let Some(risk) = self.sensitive.risk(&perm.key(), perm.scope) {
                    reason.push_str(&format!(", RISK: {}", risk));
                }
                issue = issue.reason(reason);
            }
            tracing::debug!(workload = %workload.id(), reasons = issue.reasons.len(), "excessive permissions found");
            issues.push(issue);
        }

        tracing::info!(issues = issues.len(), "permission comparison done");
        issues
    }

    /// Left entries paired with their right counterpart, in left order.
    fn align(&self) -> Vec<(&'a WorkloadPerms<'s>, Option<&'a WorkloadPerms<'s>>)> {
        let right_by_id: HashMap<WorkloadId, &'a WorkloadPerms<'s>> =
            self.right.iter().map(|r| (r.workload.id(), r)).collect();
        let left_ids: HashSet<WorkloadId> = self.left.iter().map(|l| l.workload.id()).collect();

        for right in self.right {
            let id = right.workload.id();
            if !left_ids.contains(&id) {
                tracing::debug!(workload = %id, "workload only seen in behavior results, ignoring");
            }
        }

        self.left
            .iter()
            .map(|left| {
                let right = right_by_id.get(&left.workload.id()).copied();
                if right.is_none() {
                    tracing::warn!(
                        workload = %left.workload.id(),
                        "no observed API calls for workload, maybe not a Go container or analysis failed"
                    );
                }
                (left, right)
            })
            .collect()
    }
}

fn perm_keys(perms: &[EPScanPermission]) -> HashSet<PermissionKey> {
    perms.iter().map(EPScanPermission::key).collect()
}
