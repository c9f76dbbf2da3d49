// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Behavior side: what each workload was observed to call.
//!
//! Two inputs come from the source-analysis stage of a project:
//!
//! - `codeql.csv`: one row per Kubernetes API call site, keyed by the program
//!   entrypoint (`source_name`, `entrypoint`) it is reachable from
//! - `matched_pod.json`: which entrypoints each workload runs, as an array of
//!   `[pod_kind, pod_name, source_name, main_file_path, rule]` tuples

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyse::WorkloadPerms;
use crate::k8s::workload::Workload;
use crate::perm::EPScanPermission;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub source_name: String,
    pub entrypoint: String,
    pub parent: String,
    pub resource_type: String,
    pub verb: String,
    pub location: String,
}

impl CallSite {
    /// A call site says nothing about breadth, so the scope is unknown.
    pub fn to_permission(&self) -> EPScanPermission {
        EPScanPermission::new(self.resource_type.as_str(), self.verb.as_str(), None)
    }
}

pub fn read_callsites(path: &Path) -> Result<Vec<CallSite>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open call-site results: {}", path.display()))?;
    read_callsites_from(file).with_context(|| format!("Failed to parse call-site results: {}", path.display()))
}

pub fn read_callsites_from<R: Read>(reader: R) -> Result<Vec<CallSite>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<CallSite>().enumerate() {
        out.push(row.with_context(|| format!("row {}", idx + 2))?);
    }
    tracing::info!(callsites = out.len(), "parsed call-site results");
    Ok(out)
}

/// One workload ↔ entrypoint association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MatchTuple", into = "MatchTuple")]
pub struct PodMatch {
    pub pod_kind: String,
    pub pod_name: String,
    pub source_name: String,
    pub main_file_path: String,
    /// Name of the matching rule that produced the association, if any.
    pub rule: Option<String>,
}

type MatchTuple = (String, String, String, String, Option<String>);

impl From<MatchTuple> for PodMatch {
    fn from((pod_kind, pod_name, source_name, main_file_path, rule): MatchTuple) -> Self {
        Self { pod_kind, pod_name, source_name, main_file_path, rule }
    }
}

impl From<PodMatch> for MatchTuple {
    fn from(m: PodMatch) -> Self {
        (m.pod_kind, m.pod_name, m.source_name, m.main_file_path, m.rule)
    }
}

pub fn read_matched_pods(path: &Path) -> Result<Vec<PodMatch>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pod matches: {}", path.display()))?;
    let matches: Vec<PodMatch> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse pod matches: {}", path.display()))?;
    Ok(matches)
}

/// Read both behavior inputs and build the right-side permission sets.
///
/// Both files must exist. Without them there is nothing to diff against, so a
/// missing file is an error rather than an empty right side.
pub fn load_behavior<'s>(store: &'s RecordStore, callsites_path: &Path, matches_path: &Path) -> Result<Vec<WorkloadPerms<'s>>> {
    for path in [callsites_path, matches_path] {
        if !path.is_file() {
            bail!("Behavior results not found: {}", path.display());
        }
    }
    let callsites = read_callsites(callsites_path)?;
    let matches = read_matched_pods(matches_path)?;
    Ok(match_callsites(store, &matches, &callsites))
}

/// Right-side permission sets: for each matched workload, the call sites of
/// every entrypoint it runs. Workloads appear in first-match order.
pub fn match_callsites<'s>(store: &'s RecordStore, matches: &[PodMatch], callsites: &[CallSite]) -> Vec<WorkloadPerms<'s>> {
    let mut by_entrypoint: HashMap<(&str, &str), Vec<&CallSite>> = HashMap::new();
    for cs in callsites {
        by_entrypoint
            .entry((cs.source_name.as_str(), cs.entrypoint.as_str()))
            .or_default()
            .push(cs);
    }

    let mut results: Vec<WorkloadPerms<'s>> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    for m in matches {
        let key = (m.pod_kind.as_str(), m.pod_name.as_str());
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                let Some(workload) = resolve_workload(store, m) else {
                    continue;
                };
                index.insert(key, results.len());
                results.push(WorkloadPerms::new(workload, Vec::new()));
                results.len() - 1
            }
        };

        let sites = by_entrypoint
            .get(&(m.source_name.as_str(), m.main_file_path.as_str()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        results[slot].perms.extend(sites.iter().map(|cs| cs.to_permission()));
    }
    results
}

fn resolve_workload<'s>(store: &'s RecordStore, m: &PodMatch) -> Option<Workload<'s>> {
    let candidates: Vec<_> = store
        .search_by_kind(&m.pod_kind)
        .into_iter()
        .filter(|r| r.name() == Some(m.pod_name.as_str()))
        .collect();
    let Some(&record) = candidates.first() else {
        tracing::warn!(kind = %m.pod_kind, name = %m.pod_name, "matched workload not in configuration, skipping");
        return None;
    };
    if candidates.len() > 1 {
        // matches carry no namespace; the others keep an empty right side
        tracing::warn!(
            kind = %m.pod_kind,
            name = %m.pod_name,
            candidates = candidates.len(),
            "matched workload name is ambiguous, using the first; the rest will be over-reported"
        );
    }
    let workload = Workload::new(record, store);
    if workload.is_none() {
        tracing::warn!(kind = %m.pod_kind, name = %m.pod_name, "matched object is not a workload, skipping");
    }
    workload
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLSITES: &str = "\
source_name,entrypoint,parent,resource_type,verb,location
operator,cmd/operator/main.go,reconcile,pods,update,pkg/ctrl.go:42
operator,cmd/operator/main.go,reconcile,pods,get,pkg/ctrl.go:40
operator,cmd/webhook/main.go,serve,secrets,get,pkg/hook.go:12
";

    const CONFIG: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata: {name: operator, namespace: ops}
spec:
  template:
    spec:
      containers: [{name: op, image: op:1}]
---
apiVersion: v1
kind: ConfigMap
metadata: {name: settings}
---
apiVersion: apps/v1
kind: Deployment
metadata: {name: worker, namespace: blue}
spec:
  template:
    spec:
      containers: [{name: w, image: w:1}]
---
apiVersion: apps/v1
kind: Deployment
metadata: {name: worker, namespace: green}
spec:
  template:
    spec:
      containers: [{name: w, image: w:1}]
"#;

    #[test]
    fn test_read_callsites() {
        let sites = read_callsites_from(CALLSITES.as_bytes()).unwrap();
        assert_eq!(sites.len(), 3);
        assert_eq!(sites[2].resource_type, "secrets");
        assert_eq!(sites[0].to_permission(), EPScanPermission::new("pods", "update", None));
    }

    #[test]
    fn test_matched_pods_json_tuples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matched_pod.json");
        std::fs::write(
            &path,
            r#"[["Deployment", "operator", "operator", "cmd/operator/main.go", "same-name"],
                ["Deployment", "operator", "operator", "cmd/webhook/main.go", null]]"#,
        )
        .unwrap();
        let matches = read_matched_pods(&path).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].rule.as_deref(), Some("same-name"));
        assert_eq!(matches[1].rule, None);
        assert_eq!(
            serde_json::to_value(&matches[1]).unwrap(),
            serde_json::json!(["Deployment", "operator", "operator", "cmd/webhook/main.go", null])
        );
    }

    #[test]
    fn test_match_callsites_groups_by_workload() {
        let store = RecordStore::from_yaml_str(CONFIG).unwrap();
        let sites = read_callsites_from(CALLSITES.as_bytes()).unwrap();
        let entry = |kind: &str, name: &str, main: &str| PodMatch {
            pod_kind: kind.to_string(),
            pod_name: name.to_string(),
            source_name: "operator".to_string(),
            main_file_path: main.to_string(),
            rule: None,
        };
        let matches = vec![
            entry("Deployment", "operator", "cmd/operator/main.go"),
            entry("Deployment", "ghost", "cmd/operator/main.go"),
            entry("ConfigMap", "settings", "cmd/operator/main.go"),
            entry("Deployment", "operator", "cmd/webhook/main.go"),
            entry("Deployment", "operator", "cmd/unknown/main.go"),
        ];

        let right = match_callsites(&store, &matches, &sites);
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].workload.name(), "operator");
        let keys: Vec<_> = right[0].perms.iter().map(|p| p.to_string()).collect();
        assert_eq!(keys, vec!["(pods, update, ?)", "(pods, get, ?)", "(secrets, get, ?)"]);
    }

    #[test]
    fn test_ambiguous_match_takes_first_workload() {
        let store = RecordStore::from_yaml_str(CONFIG).unwrap();
        let sites = read_callsites_from(CALLSITES.as_bytes()).unwrap();
        let matches = vec![PodMatch {
            pod_kind: "Deployment".to_string(),
            pod_name: "worker".to_string(),
            source_name: "operator".to_string(),
            main_file_path: "cmd/webhook/main.go".to_string(),
            rule: None,
        }];

        let right = match_callsites(&store, &matches, &sites);
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].workload.id().namespace.as_deref(), Some("blue"));
        assert_eq!(right[0].perms, vec![EPScanPermission::new("secrets", "get", None)]);
    }

    #[test]
    fn test_load_behavior_requires_both_files() {
        let store = RecordStore::from_yaml_str(CONFIG).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let callsites = dir.path().join("codeql.csv");
        let matches = dir.path().join("matched_pod.json");

        let err = load_behavior(&store, &callsites, &matches).unwrap_err();
        assert!(err.to_string().contains("codeql.csv"), "{}", err);

        std::fs::write(&callsites, CALLSITES).unwrap();
        let err = load_behavior(&store, &callsites, &matches).unwrap_err();
        assert!(err.to_string().contains("matched_pod.json"), "{}", err);

        std::fs::write(&matches, r#"[["Deployment", "operator", "operator", "cmd/webhook/main.go", null]]"#).unwrap();
        let right = load_behavior(&store, &callsites, &matches).unwrap();
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].perms, vec![EPScanPermission::new("secrets", "get", None)]);
    }
}
