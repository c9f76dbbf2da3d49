// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Typed decode of store records by `kind`.

use crate::k8s::rbac::{
    Role, RoleBinding, ServiceAccount, KIND_CLUSTER_ROLE, KIND_CLUSTER_ROLE_BINDING, KIND_ROLE,
    KIND_ROLE_BINDING, KIND_SERVICE_ACCOUNT,
};
use crate::k8s::workload::Workload;
use crate::store::{Record, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ServiceAccount,
    RoleBinding,
    ClusterRoleBinding,
    Role,
    ClusterRole,
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    ReplicaSet,
    Other,
}

impl ObjectKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            KIND_SERVICE_ACCOUNT => ObjectKind::ServiceAccount,
            KIND_ROLE_BINDING => ObjectKind::RoleBinding,
            KIND_CLUSTER_ROLE_BINDING => ObjectKind::ClusterRoleBinding,
            KIND_ROLE => ObjectKind::Role,
            KIND_CLUSTER_ROLE => ObjectKind::ClusterRole,
            "Pod" => ObjectKind::Pod,
            "Deployment" => ObjectKind::Deployment,
            "StatefulSet" => ObjectKind::StatefulSet,
            "DaemonSet" => ObjectKind::DaemonSet,
            "Job" => ObjectKind::Job,
            "CronJob" => ObjectKind::CronJob,
            "ReplicaSet" => ObjectKind::ReplicaSet,
            _ => ObjectKind::Other,
        }
    }

    pub fn is_workload(&self) -> bool {
        matches!(
            self,
            ObjectKind::Pod
                | ObjectKind::Deployment
                | ObjectKind::StatefulSet
                | ObjectKind::DaemonSet
                | ObjectKind::Job
                | ObjectKind::CronJob
                | ObjectKind::ReplicaSet
        )
    }
}

/// A record resolved into the view for its kind.
#[derive(Debug)]
pub enum TypedObject<'s> {
    ServiceAccount(ServiceAccount<'s>),
    RoleBinding(RoleBinding<'s>),
    Role(Role<'s>),
    Workload(Workload<'s>),
    Other(&'s Record),
}

impl<'s> TypedObject<'s> {
    pub fn record(&self) -> &'s Record {
        match self {
            TypedObject::ServiceAccount(sa) => sa.record(),
            TypedObject::RoleBinding(rb) => rb.record(),
            TypedObject::Role(role) => role.record(),
            TypedObject::Workload(w) => w.record(),
            TypedObject::Other(record) => record,
        }
    }
}

impl RecordStore {
    /// Decode `record` (which must belong to this store) into its typed view.
    pub fn typed<'s>(&'s self, record: &'s Record) -> TypedObject<'s> {
        let kind = ObjectKind::from_kind(record.kind().unwrap_or(""));
        match kind {
            ObjectKind::ServiceAccount => TypedObject::ServiceAccount(ServiceAccount::new(record, self)),
            ObjectKind::RoleBinding | ObjectKind::ClusterRoleBinding => {
                TypedObject::RoleBinding(RoleBinding::new(record, self))
            }
            ObjectKind::Role | ObjectKind::ClusterRole => TypedObject::Role(Role::new(record, self)),
            k if k.is_workload() => match Workload::new(record, self) {
                Some(w) => TypedObject::Workload(w),
                None => TypedObject::Other(record),
            },
            _ => {
                if record.get(&["spec", "template"]).is_some() {
                    tracing::warn!(kind = record.kind().unwrap_or(""), record = %record, "unknown workload kind");
                }
                TypedObject::Other(record)
            }
        }
    }

    /// Every record decoded, in insertion order.
    pub fn objects(&self) -> Vec<TypedObject<'_>> {
        self.iter().map(|r| self.typed(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatches_on_kind() {
        let store = RecordStore::from_yaml_str(
            r#"
apiVersion: v1
kind: ServiceAccount
metadata: {name: sa}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata: {name: crb}
roleRef: {kind: ClusterRole, name: view}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata: {name: view}
rules: []
---
apiVersion: apps/v1
kind: DaemonSet
metadata: {name: agent}
spec: {template: {spec: {containers: []}}}
---
apiVersion: example.com/v1
kind: Rollout
metadata: {name: canary}
spec: {template: {spec: {containers: []}}}
"#,
        )
        .unwrap();

        let objects = store.objects();
        assert!(matches!(objects[0], TypedObject::ServiceAccount(_)));
        assert!(matches!(objects[1], TypedObject::RoleBinding(_)));
        assert!(matches!(objects[2], TypedObject::Role(_)));
        assert!(matches!(objects[3], TypedObject::Workload(_)));
        // templated custom kinds are not analysed
        assert!(matches!(objects[4], TypedObject::Other(_)));
        assert_eq!(objects[4].record().name(), Some("canary"));
    }

    #[test]
    fn test_kind_table() {
        assert_eq!(ObjectKind::from_kind("ClusterRole"), ObjectKind::ClusterRole);
        assert_eq!(ObjectKind::from_kind("Secret"), ObjectKind::Other);
        assert!(ObjectKind::from_kind("CronJob").is_workload());
        assert!(!ObjectKind::from_kind("Role").is_workload());
    }
}
