// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Container carriers: Pods and the controllers that template them.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::PolicyResult;
use crate::k8s::rbac::{get_service_account_by_name, ServiceAccount, DEFAULT_SERVICE_ACCOUNT};
use crate::store::{Record, RecordStore};

/// Kinds that run containers.
pub const WORKLOAD_KINDS: &[&str] = &[
    "Pod",
    "Deployment",
    "StatefulSet",
    "DaemonSet",
    "Job",
    "CronJob",
    "ReplicaSet",
];

/// RBAC resource names of [`WORKLOAD_KINDS`], same order.
pub const WORKLOAD_RESOURCES: &[&str] = &[
    "pods",
    "deployments",
    "statefulsets",
    "daemonsets",
    "jobs",
    "cronjobs",
    "replicasets",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerType {
    Container,
    InitContainer,
    EphemeralContainer,
}

/// One container entry of a pod spec.
#[derive(Debug, Clone, Copy)]
pub struct Container<'s> {
    pub kind: ContainerType,
    data: &'s Value,
}

impl<'s> Container<'s> {
    pub fn name(&self) -> &'s str {
        self.data.get("name").and_then(Value::as_str).unwrap_or("")
    }

    pub fn image(&self) -> &'s str {
        self.data.get("image").and_then(Value::as_str).unwrap_or("")
    }

    pub fn command(&self) -> Option<Vec<&'s str>> {
        string_list(self.data.get("command"))
    }

    pub fn args(&self) -> Option<Vec<&'s str>> {
        string_list(self.data.get("args"))
    }

    /// `command` followed by `args`, when the command is set explicitly.
    pub fn full_command(&self) -> Option<Vec<&'s str>> {
        let mut full = self.command()?;
        full.extend(self.args().unwrap_or_default());
        Some(full)
    }

    /// Basename of the program the container runs.
    ///
    /// A leading `tini` init is skipped up to its `--` separator (or just the
    /// `tini` word if there is none). Any first element whose basename is
    /// `tini` counts, so a bare `tini` on `PATH` is unwrapped as well as
    /// `/sbin/tini`. `None` when the command is not set in the
    /// manifest, since resolving it would need the image config.
    pub fn executable_name(&self) -> Option<&'s str> {
        let full = self.full_command()?;
        let mut rest = full.as_slice();

        if rest.first().is_some_and(|first| basename(first) == "tini") {
            let start = rest.iter().position(|arg| *arg == "--").map_or(1, |i| i + 1);
            tracing::debug!(command = ?full, "skipping tini wrapper");
            rest = rest.get(start..).unwrap_or(&[]);
        }

        let first: &'s str = rest.first().copied()?;
        let exe = basename(first);
        if exe.ends_with(".sh") {
            tracing::debug!(exe, container = self.name(), "entrypoint is a shell script");
        }
        (!exe.is_empty()).then_some(exe)
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<&str>> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Stable identity of a workload for alignment and reporting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkloadId {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl WorkloadId {
    pub fn new(kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// View over a Pod or a pod-templating controller.
#[derive(Debug, Clone, Copy)]
pub struct Workload<'s> {
    record: &'s Record,
    store: &'s RecordStore,
}

impl<'s> Workload<'s> {
    /// `None` unless the record's kind is one of [`WORKLOAD_KINDS`].
    pub fn new(record: &'s Record, store: &'s RecordStore) -> Option<Self> {
        let kind = record.kind()?;
        WORKLOAD_KINDS.contains(&kind).then_some(Self { record, store })
    }

    pub fn record(&self) -> &'s Record {
        self.record
    }

    pub fn kind(&self) -> &'s str {
        self.record.kind().unwrap_or("")
    }

    pub fn name(&self) -> &'s str {
        self.record.name().unwrap_or("")
    }

    pub fn id(&self) -> WorkloadId {
        WorkloadId::new(self.kind(), self.record.namespace(), self.name())
    }

    /// The pod spec containers are started from.
    pub fn pod_spec(&self) -> Option<&'s Value> {
        let path: &[&str] = match self.kind() {
            "Pod" => &["spec"],
            "CronJob" => &["spec", "jobTemplate", "spec", "template", "spec"],
            _ => &["spec", "template", "spec"],
        };
        self.record.get(path)
    }

    pub fn containers(&self) -> Vec<Container<'s>> {
        let Some(spec) = self.pod_spec() else {
            return Vec::new();
        };
        [
            ("containers", ContainerType::Container),
            ("initContainers", ContainerType::InitContainer),
            ("ephemeralContainers", ContainerType::EphemeralContainer),
        ]
        .into_iter()
        .flat_map(move |(key, kind)| {
            spec.get(key)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(move |data| Container { kind, data })
        })
        .collect()
    }

    /// `serviceAccountName`, then the deprecated `serviceAccount`, else `default`.
    pub fn service_account_name(&self) -> &'s str {
        let spec = self.pod_spec();
        let field = |key: &str| spec.and_then(|s| s.get(key)).and_then(Value::as_str);
        match field("serviceAccountName").or_else(|| field("serviceAccount")) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_SERVICE_ACCOUNT,
        }
    }

    pub fn service_account(&self) -> PolicyResult<ServiceAccount<'s>> {
        get_service_account_by_name(self.store, self.service_account_name())
    }
}

/// Every container carrier in the store, in insertion order.
pub fn workloads(store: &RecordStore) -> Vec<Workload<'_>> {
    store.iter().filter_map(|r| Workload::new(r, store)).collect()
}

/// Container carriers running as the named service account.
pub fn find_workloads_by_service_account<'s>(store: &'s RecordStore, service_account: &str) -> Vec<Workload<'s>> {
    workloads(store)
        .into_iter()
        .filter(|w| w.service_account_name() == service_account)
        .collect()
}
