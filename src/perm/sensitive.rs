// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Sensitivity catalog: permissions worth reporting when held but unused.
//!
//! Rows are `resource,verb,scope,risk`. The `workload` pseudo-resource stands
//! for every resource that runs containers, verbs are `/`-separated and the
//! scope is the narrowest breadth at which the permission becomes dangerous.
//!
//! Two lookups are derived from the rows. The *lookup map* keeps, per
//! `(resource, verb)`, the entry with the LOWEST scope so that a granted
//! permission matches whenever any listed breadth could be exploited. The
//! *risk map* answers "what does holding this key at scope S risk", picking the
//! broadest row that S still covers.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{PolicyError, PolicyResult};
use crate::k8s::workload::WORKLOAD_RESOURCES;
use crate::perm::{EPScanPermission, PermissionKey, PermissionScope};

const BUILTIN_SENSITIVE: &str = include_str!("../../data/sensitive_perm_rules.csv");

/// Resource cell value standing for all workload resources.
pub const WORKLOAD_PSEUDO_RESOURCE: &str = "workload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivePermission {
    pub perm: EPScanPermission,
    pub risk: String,
}

#[derive(Debug, Deserialize)]
struct SensitiveRow {
    resource: String,
    verb: String,
    scope: String,
    #[serde(default)]
    risk: String,
}

#[derive(Debug, Clone, Default)]
pub struct SensitiveCatalog {
    perms: Vec<SensitivePermission>,
    lookup: HashMap<PermissionKey, EPScanPermission>,
    risks: HashMap<(PermissionKey, PermissionScope), String>,
}

impl SensitiveCatalog {
    pub fn builtin() -> PolicyResult<Self> {
        Self::from_reader(BUILTIN_SENSITIVE.as_bytes())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open sensitivity catalog: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse sensitivity catalog: {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> PolicyResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut perms = Vec::new();
        for (idx, row) in rdr.deserialize::<SensitiveRow>().enumerate() {
            let line = idx + 2;
            let row = row.map_err(|e| catalog_error(line, e.to_string()))?;
            let scope = PermissionScope::parse(&row.scope).map_err(|msg| catalog_error(line, msg))?;

            let resources: Vec<&str> = if row.resource == WORKLOAD_PSEUDO_RESOURCE {
                WORKLOAD_RESOURCES.to_vec()
            } else {
                vec![row.resource.as_str()]
            };
            for resource in resources {
                for verb in row.verb.split('/').map(str::trim).filter(|v| !v.is_empty()) {
                    perms.push(SensitivePermission {
                        perm: EPScanPermission::new(resource, verb, scope),
                        risk: row.risk.clone(),
                    });
                }
            }
        }
        Ok(Self::from_perms(perms))
    }

    pub fn from_perms(perms: Vec<SensitivePermission>) -> Self {
        let lookup = build_lookup_map(&perms);
        let risks = build_risk_map(&perms);
        Self { perms, lookup, risks }
    }

    pub fn perms(&self) -> &[SensitivePermission] {
        &self.perms
    }

    /// Lowest-scope sensitive entry for `key`, if the key is sensitive at all.
    pub fn lookup(&self, key: &PermissionKey) -> Option<&EPScanPermission> {
        self.lookup.get(key)
    }

    /// Risk of holding `key` at `scope`. `None` scope has no label.
    pub fn risk(&self, key: &PermissionKey, scope: Option<PermissionScope>) -> Option<&str> {
        let scope = scope?;
        self.risks.get(&(key.clone(), scope)).map(String::as_str)
    }
}

fn build_lookup_map(perms: &[SensitivePermission]) -> HashMap<PermissionKey, EPScanPermission> {
    let mut map: HashMap<PermissionKey, EPScanPermission> = HashMap::new();
    for sp in perms {
        // an unknown scope sorts below every known one, so it wins as "lowest"
        map.entry(sp.perm.key())
            .and_modify(|kept| {
                if sp.perm.scope < kept.scope {
                    *kept = sp.perm.clone();
                }
            })
            .or_insert_with(|| sp.perm.clone());
    }
    map
}

fn build_risk_map(perms: &[SensitivePermission]) -> HashMap<(PermissionKey, PermissionScope), String> {
    let mut by_key: HashMap<PermissionKey, Vec<&SensitivePermission>> = HashMap::new();
    for sp in perms {
        by_key.entry(sp.perm.key()).or_default().push(sp);
    }

    let mut risks = HashMap::new();
    for (key, mut entries) in by_key {
        // broadest first; stable so equal scopes keep file order
        entries.sort_by(|a, b| b.perm.scope.cmp(&a.perm.scope));
        for scope in PermissionScope::ALL {
            if let Some(sp) = entries.iter().find(|sp| sp.perm.scope <= Some(scope)) {
                risks.insert((key.clone(), scope), sp.risk.clone());
            }
        }
    }
    risks
}

fn catalog_error(line: usize, message: String) -> PolicyError {
    PolicyError::Catalog { table: "sensitive_perm_rules", line, message }
}
