// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! A single parsed configuration document.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// One Kubernetes object as parsed from a configuration file.
///
/// Records are never mutated once stored. A record missing `apiVersion`, `kind`
/// or `metadata.name` is still kept, but [`Record::is_well_formed`] reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    data: Value,
    source_path: Option<PathBuf>,
    well_formed: bool,
}

impl Record {
    pub fn new(data: Value) -> Self {
        let well_formed = data.get("apiVersion").is_some()
            && data.get("kind").is_some()
            && data.pointer("/metadata/name").is_some();
        Self { data, source_path: None, well_formed }
    }

    /// Attach the file this record was read from.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    /// Walk a nested field path. Any missing or non-mapping step yields `None`.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.data, |cur, seg| cur.as_object()?.get(*seg))
    }

    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.get_str(&["apiVersion"])
    }

    pub fn kind(&self) -> Option<&str> {
        self.get_str(&["kind"])
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(&["metadata", "name"])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.get_str(&["metadata", "namespace"])
    }

    pub fn labels(&self) -> Option<&Map<String, Value>> {
        self.get(&["metadata", "labels"]).and_then(Value::as_object)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.kind().unwrap_or("Object"),
            self.name().unwrap_or("<unnamed>")
        )?;
        if let Some(path) = &self.source_path {
            write!(f, " from {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_requires_identity_fields() {
        let ok = Record::new(json!({
            "apiVersion": "v1", "kind": "ServiceAccount", "metadata": {"name": "sa"}
        }));
        assert!(ok.is_well_formed());

        let no_name = Record::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}}));
        assert!(!no_name.is_well_formed());
        assert_eq!(no_name.kind(), Some("Pod"));
    }

    #[test]
    fn test_nested_get_stops_at_missing_segment() {
        let r = Record::new(json!({"metadata": {"labels": {"app": "web"}}}));
        assert_eq!(r.get_str(&["metadata", "labels", "app"]), Some("web"));
        assert!(r.get(&["metadata", "annotations", "x"]).is_none());
        assert!(r.get(&["metadata", "labels", "app", "deeper"]).is_none());
    }
}
