// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Reference catalog of every `(resource, verb)` the API surface knows about.
//!
//! The builtin table (`data/all_perm.csv`) is the output of
//! `kubectl api-resources -o wide` flattened to CSV: one row per resource,
//! the supported verbs spread over the trailing columns.
//!
//! ```text
//! name,shortnames,apiversion,namespaced,kind,verbs
//! pods,po,v1,true,Pod,create,delete,deletecollection,get,list,patch,update,watch
//! ```

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::{PolicyError, PolicyResult};
use crate::k8s::rbac::{AccessRequest, CanI};
use crate::perm::PermissionScope;

const BUILTIN_ALL_PERM: &str = include_str!("../../data/all_perm.csv");

/// A concrete permission kind from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Permission {
    pub resource: String,
    pub verb: String,
    /// `""` is the core group.
    pub api_group: String,
    pub api_version: String,
}

impl Permission {
    pub fn new(resource: &str, verb: &str, api_group: &str, api_version: &str) -> Self {
        Self {
            resource: resource.to_string(),
            verb: verb.to_string(),
            api_group: api_group.to_string(),
            api_version: api_version.to_string(),
        }
    }

    pub fn request(&self) -> AccessRequest<'_> {
        AccessRequest::new(&self.api_group, &self.verb, &self.resource)
    }

    /// Whether `subject` holds this permission through rules of exactly `scope`.
    pub fn is_permitted_to(&self, subject: &impl CanI, scope: Option<PermissionScope>) -> PolicyResult<bool> {
        let mut request = self.request();
        request.strict_scope = scope;
        subject.can_i(&request)
    }
}

/// Immutable, ordered, duplicate-free permission list.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    perms: Vec<Permission>,
}

impl PermissionCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> PolicyResult<Self> {
        Self::from_reader(BUILTIN_ALL_PERM.as_bytes())
    }

    /// Load an alternative catalog file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open permission catalog: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse permission catalog: {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> PolicyResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut seen = HashSet::new();
        let mut perms = Vec::new();
        for (idx, row) in rdr.records().enumerate() {
            // header is line 1
            let line = idx + 2;
            let row = row.map_err(|e| catalog_error(line, e.to_string()))?;
            if row.iter().all(str::is_empty) {
                continue;
            }

            let resource = row.get(0).unwrap_or("");
            let api_gv = row.get(2).unwrap_or("");
            if resource.is_empty() || api_gv.is_empty() {
                return Err(catalog_error(line, "missing resource name or apiversion".to_string()));
            }
            let (api_group, api_version) = api_gv.split_once('/').unwrap_or(("", api_gv));

            for verb in row.iter().skip(5).filter(|v| !v.is_empty()) {
                let perm = Permission::new(resource, verb, api_group, api_version);
                if seen.insert(perm.clone()) {
                    perms.push(perm);
                }
            }
        }
        Ok(Self { perms })
    }

    pub fn len(&self) -> usize {
        self.perms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perms.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Permission> {
        self.perms.iter()
    }

    pub fn contains(&self, resource: &str, verb: &str) -> bool {
        self.perms.iter().any(|p| p.resource == resource && p.verb == verb)
    }
}

impl<'c> IntoIterator for &'c PermissionCatalog {
    type Item = &'c Permission;
    type IntoIter = std::slice::Iter<'c, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.perms.iter()
    }
}

fn catalog_error(line: usize, message: String) -> PolicyError {
    PolicyError::Catalog { table: "all_perm", line, message }
}
