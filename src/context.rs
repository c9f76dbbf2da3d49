// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Read-only reference tables handed to the analysers.
//!
//! Built once per process (or per test) and passed by reference. The builtin
//! tables are also available as a lazily initialized process-wide instance.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;

use crate::config::CatalogConfig;
use crate::error::PolicyResult;
use crate::perm::{PermissionCatalog, SensitiveCatalog};

static BUILTIN: OnceLock<PolicyContext> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub permissions: PermissionCatalog,
    pub sensitive: SensitiveCatalog,
}

impl PolicyContext {
    pub fn new(permissions: PermissionCatalog, sensitive: SensitiveCatalog) -> Self {
        Self { permissions, sensitive }
    }

    /// Shared instance over the compiled-in tables.
    pub fn builtin() -> PolicyResult<&'static PolicyContext> {
        if let Some(ctx) = BUILTIN.get() {
            return Ok(ctx);
        }
        let ctx = PolicyContext::new(PermissionCatalog::builtin()?, SensitiveCatalog::builtin()?);
        Ok(BUILTIN.get_or_init(|| ctx))
    }

    /// Tables named in the config, falling back to the builtin ones for empty paths.
    pub fn from_config(config: &CatalogConfig) -> Result<PolicyContext> {
        let builtin = PolicyContext::builtin()?;
        let permissions = match non_empty(&config.permissions) {
            Some(path) => PermissionCatalog::from_path(path)?,
            None => builtin.permissions.clone(),
        };
        let sensitive = match non_empty(&config.sensitive) {
            Some(path) => SensitiveCatalog::from_path(path)?,
            None => builtin.sensitive.clone(),
        };
        tracing::debug!(permissions = permissions.len(), sensitive = sensitive.perms().len(), "reference tables ready");
        Ok(PolicyContext::new(permissions, sensitive))
    }
}

fn non_empty(path: &str) -> Option<&Path> {
    (!path.trim().is_empty()).then(|| Path::new(path))
}
