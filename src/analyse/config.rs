// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Configuration side: what each workload is granted.

use std::collections::HashMap;

use crate::analyse::WorkloadPerms;
use crate::context::PolicyContext;
use crate::error::PolicyResult;
use crate::k8s::rbac::CanI;
use crate::k8s::workload::workloads;
use crate::perm::{EPScanPermission, PermissionCatalog, PermissionKey, PermissionScope};
use crate::store::RecordStore;

/// Every catalog permission `subject` holds, one entry per `(resource, verb)`.
///
/// Each catalog entry is tested at every scope; when the same key holds at
/// several scopes only the broadest is kept. Entries appear in catalog order.
pub fn list_all_perms(subject: &impl CanI, catalog: &PermissionCatalog) -> PolicyResult<Vec<EPScanPermission>> {
    let mut perms: Vec<EPScanPermission> = Vec::new();
    let mut index: HashMap<PermissionKey, usize> = HashMap::new();

    for perm in catalog {
        for scope in PermissionScope::ALL {
            if !perm.is_permitted_to(subject, Some(scope))? {
                continue;
            }
            let found = EPScanPermission::new(perm.resource.as_str(), perm.verb.as_str(), Some(scope));
            match index.get(&found.key()) {
                Some(&i) => {
                    if found.scope > perms[i].scope {
                        perms[i] = found;
                    }
                }
                None => {
                    index.insert(found.key(), perms.len());
                    perms.push(found);
                }
            }
        }
    }
    Ok(perms)
}

/// Runs [`list_all_perms`] for every container carrier in a store.
///
/// ```text
/// let analyser = WorkloadPermAnalyser::new(&ctx);
/// let left = analyser.analyse(&store);
/// ```
pub struct WorkloadPermAnalyser<'c> {
    ctx: &'c PolicyContext,
}

impl<'c> WorkloadPermAnalyser<'c> {
    pub fn new(ctx: &'c PolicyContext) -> Self {
        Self { ctx }
    }

    /// One entry per workload whose service account resolved cleanly.
    /// A failing workload is logged and left out; the rest are still analysed.
    pub fn analyse<'s>(&self, store: &'s RecordStore) -> Vec<WorkloadPerms<'s>> {
        // workloads sharing a service account share its permission set
        let mut by_account: HashMap<&'s str, PolicyResult<Vec<EPScanPermission>>> = HashMap::new();
        let mut results = Vec::new();

        for workload in workloads(store) {
            let account = workload.service_account_name();
            let perms = by_account.entry(account).or_insert_with(|| {
                let sa = workload.service_account()?;
                list_all_perms(&sa, &self.ctx.permissions)
            });

            match perms {
                Ok(perms) => {
                    tracing::debug!(workload = %workload.id(), account, perms = perms.len(), "enumerated permissions");
                    results.push(WorkloadPerms::new(workload, perms.clone()));
                }
                Err(e) => {
                    tracing::warn!(workload = %workload.id(), account, error = %e, "failed to resolve permissions, skipping workload");
                }
            }
        }

        tracing::info!(workloads = results.len(), "configuration analysis done");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::rbac::get_service_account_by_name;
    use PermissionScope::*;

    fn ctx() -> &'static PolicyContext {
        PolicyContext::builtin().unwrap()
    }

    fn p(resource: &str, verb: &str, scope: PermissionScope) -> EPScanPermission {
        EPScanPermission::new(resource, verb, Some(scope))
    }

    const MIXED_GRANTS: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata: {name: test-sa, namespace: default}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata: {name: test-role, namespace: default}
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get", "watch"]
  - apiGroups: [""]
    resources: ["pods"]
    resourceNames: ["web-0"]
    verbs: ["get", "list"]
  - apiGroups: ["apps"]
    resources: ["deployments"]
    resourceNames: ["web"]
    verbs: ["get"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata: {name: test-cluster-role}
rules:
  - apiGroups: [""]
    resources: ["secrets"]
    verbs: ["list"]
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get", "patch", "update"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata: {name: test-rb, namespace: default}
roleRef: {apiGroup: rbac.authorization.k8s.io, kind: Role, name: test-role}
subjects:
  - {kind: ServiceAccount, name: test-sa, namespace: default}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata: {name: test-crb}
roleRef: {apiGroup: rbac.authorization.k8s.io, kind: ClusterRole, name: test-cluster-role}
subjects:
  - {kind: ServiceAccount, name: test-sa, namespace: default}
"#;

    #[test]
    fn test_list_all_perms_keeps_broadest_scope() {
        let store = RecordStore::from_yaml_str(MIXED_GRANTS).unwrap();
        let sa = get_service_account_by_name(&store, "test-sa").unwrap();
        let perms = list_all_perms(&sa, &ctx().permissions).unwrap();

        assert_eq!(perms.len(), 7, "{:?}", perms);
        // pods/get held at resource-specific, namespace and cluster breadth
        assert!(perms.contains(&p("pods", "get", Cluster)));
        assert_eq!(perms.iter().filter(|x| x.resource == "pods" && x.verb == "get").count(), 1);
        assert!(perms.contains(&p("pods", "list", ResourceSpecific)));
        assert!(perms.contains(&p("pods", "watch", Namespace)));
        assert!(perms.contains(&p("pods", "patch", Cluster)));
        assert!(perms.contains(&p("pods", "update", Cluster)));
        assert!(perms.contains(&p("secrets", "list", Cluster)));
        assert!(perms.contains(&p("deployments", "get", ResourceSpecific)));
    }

    #[test]
    fn test_core_group_subresource_grant_is_enumerated() {
        let store = RecordStore::from_yaml_str(
            r#"
apiVersion: v1
kind: ServiceAccount
metadata: {name: drainer, namespace: ops}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata: {name: evict-pods, namespace: ops}
rules:
  - apiGroups: [""]
    resources: ["pods/eviction"]
    verbs: ["create"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata: {name: drainer-evict, namespace: ops}
roleRef: {kind: Role, name: evict-pods}
subjects:
  - {kind: ServiceAccount, name: drainer, namespace: ops}
"#,
        )
        .unwrap();
        let sa = get_service_account_by_name(&store, "drainer").unwrap();
        let perms = list_all_perms(&sa, &ctx().permissions).unwrap();
        assert_eq!(perms, vec![p("pods/eviction", "create", Namespace)]);

        // the eviction grant is sensitive at namespace breadth
        let hit = ctx().sensitive.lookup(&perms[0].key()).unwrap();
        assert!(perms[0].covers(hit));
    }

    #[test]
    fn test_wildcard_resources_expand_over_catalog() {
        let store = RecordStore::from_yaml_str(
            r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata: {name: core-all, namespace: default}
rules:
  - apiGroups: [""]
    resources: ["*"]
    verbs: ["*"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata: {name: core-all, namespace: default}
roleRef: {kind: Role, name: core-all}
subjects:
  - {kind: ServiceAccount, name: default}
"#,
        )
        .unwrap();
        let sa = get_service_account_by_name(&store, "default").unwrap();
        let perms = list_all_perms(&sa, &ctx().permissions).unwrap();

        let expected: Vec<_> = ctx()
            .permissions
            .iter()
            .filter(|perm| perm.api_group.is_empty())
            .map(|perm| p(&perm.resource, &perm.verb, Namespace))
            .fold(Vec::new(), |mut acc, x| {
                if !acc.iter().any(|y: &EPScanPermission| y.key() == x.key()) {
                    acc.push(x);
                }
                acc
            });
        assert_eq!(perms, expected);
    }

    #[test]
    fn test_analyse_covers_each_workload() {
        let yaml = format!(
            "{}\n---\n{}",
            MIXED_GRANTS,
            r#"
apiVersion: apps/v1
kind: Deployment
metadata: {name: web, namespace: default}
spec:
  template:
    spec:
      serviceAccountName: test-sa
      containers: [{name: web, image: nginx}]
---
apiVersion: v1
kind: Pod
metadata: {name: idle, namespace: default}
spec:
  containers: [{name: idle, image: busybox}]
"#
        );
        let store = RecordStore::from_yaml_str(&yaml).unwrap();
        let results = WorkloadPermAnalyser::new(ctx()).analyse(&store);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].workload.name(), "web");
        assert_eq!(results[0].perms.len(), 7);
        assert_eq!(results[1].workload.name(), "idle");
        assert!(results[1].perms.is_empty());
    }

    #[test]
    fn test_failing_workload_is_isolated() {
        let store = RecordStore::from_yaml_str(
            r#"
apiVersion: v1
kind: Pod
metadata: {name: orphan}
spec:
  serviceAccountName: missing-sa
  containers: [{name: c, image: busybox}]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata: {name: fancy}
aggregationRule:
  clusterRoleSelectors:
    - matchExpressions: [{key: tier, operator: Exists}]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata: {name: fancy}
roleRef: {kind: ClusterRole, name: fancy}
subjects:
  - {kind: ServiceAccount, name: fancy-sa}
---
apiVersion: v1
kind: ServiceAccount
metadata: {name: fancy-sa}
---
apiVersion: v1
kind: Pod
metadata: {name: fancy}
spec:
  serviceAccountName: fancy-sa
  containers: [{name: c, image: busybox}]
---
apiVersion: v1
kind: Pod
metadata: {name: plain}
spec:
  containers: [{name: c, image: busybox}]
"#,
        )
        .unwrap();
        let results = WorkloadPermAnalyser::new(ctx()).analyse(&store);
        let names: Vec<_> = results.iter().map(|r| r.workload.name()).collect();
        assert_eq!(names, vec!["plain"]);
    }
}
