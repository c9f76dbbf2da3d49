// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Permission vocabulary shared by the resolver, the enumerator and the comparator.
//!
//! A permission is identified by `(resource, verb)`; the [`PermissionScope`]
//! says how broadly it is held. Two permissions with the same key and different
//! scopes are the same capability at different privilege breadth.

pub mod catalog;
pub mod sensitive;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{Permission, PermissionCatalog};
pub use sensitive::{SensitiveCatalog, SensitivePermission};

/// Breadth of a grant, ordered `ResourceSpecific < Namespace < Cluster`.
///
/// The order doubles as a privilege order: higher means more privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionScope {
    ResourceSpecific,
    Namespace,
    Cluster,
}

impl PermissionScope {
    /// Every scope, narrowest first.
    pub const ALL: [PermissionScope; 3] = [
        PermissionScope::ResourceSpecific,
        PermissionScope::Namespace,
        PermissionScope::Cluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::ResourceSpecific => "resource-specific",
            PermissionScope::Namespace => "namespace",
            PermissionScope::Cluster => "cluster",
        }
    }

    /// Parse a catalog scope cell. `?` and the empty string mean "unknown" (`None`).
    pub fn parse(s: &str) -> Result<Option<Self>, String> {
        match s.trim() {
            "" | "?" => Ok(None),
            "resource-specific" => Ok(Some(PermissionScope::ResourceSpecific)),
            "namespace" => Ok(Some(PermissionScope::Namespace)),
            "cluster" => Ok(Some(PermissionScope::Cluster)),
            other => Err(format!("invalid permission scope `{}`", other)),
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key: `(resource, verb)`.
pub type PermissionKey = (String, String);

/// A permission as the excessive-permission scan sees it.
///
/// `scope == None` means unknown/unconstrained; behavior-derived permissions
/// carry no scope because a call site says nothing about breadth.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EPScanPermission {
    pub resource: String,
    pub verb: String,
    pub scope: Option<PermissionScope>,
}

impl EPScanPermission {
    pub fn new(resource: impl Into<String>, verb: impl Into<String>, scope: Option<PermissionScope>) -> Self {
        Self { resource: resource.into(), verb: verb.into(), scope }
    }

    pub fn key(&self) -> PermissionKey {
        (self.resource.clone(), self.verb.clone())
    }

    /// Whether holding `self` is at least as broad as `other`.
    ///
    /// Keys must match. An unknown scope on either side covers.
    pub fn covers(&self, other: &EPScanPermission) -> bool {
        if self.resource != other.resource || self.verb != other.verb {
            return false;
        }
        match (self.scope, other.scope) {
            (Some(mine), Some(theirs)) => mine >= theirs,
            _ => true,
        }
    }
}

impl fmt::Display for EPScanPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "({}, {}, {})", self.resource, self.verb, scope),
            None => write!(f, "({}, {}, ?)", self.resource, self.verb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermissionScope::*;

    #[test]
    fn test_scope_total_order() {
        assert!(ResourceSpecific < Namespace);
        assert!(Namespace < Cluster);
        assert_eq!(PermissionScope::ALL.iter().max(), Some(&Cluster));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(PermissionScope::parse("cluster").unwrap(), Some(Cluster));
        assert_eq!(PermissionScope::parse("resource-specific").unwrap(), Some(ResourceSpecific));
        assert_eq!(PermissionScope::parse("?").unwrap(), None);
        assert!(PermissionScope::parse("galaxy").is_err());
    }

    #[test]
    fn test_covers() {
        let ns = EPScanPermission::new("pods", "patch", Some(Namespace));
        let cl = EPScanPermission::new("pods", "patch", Some(Cluster));
        let unknown = EPScanPermission::new("pods", "patch", None);
        assert!(cl.covers(&ns));
        assert!(!ns.covers(&cl));
        assert!(ns.covers(&unknown));
        assert!(unknown.covers(&cl));
        assert!(!ns.covers(&EPScanPermission::new("pods", "get", Some(Namespace))));
    }

    #[test]
    fn test_display() {
        assert_eq!(EPScanPermission::new("pods", "patch", Some(Namespace)).to_string(), "(pods, patch, namespace)");
        assert_eq!(EPScanPermission::new("pods", "get", None).to_string(), "(pods, get, ?)");
    }
}
