// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Findings produced by the analysers.
//!
//! An [`Issue`] names the [`Rule`] it violates, the configuration objects
//! involved and one reason line per offending item. Serialized it is a flat
//! `{rule, case, reasons, objects}` record; a scan writes a [`ScanReport`]
//! wrapping all issues of a project.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::store::{LoadedFile, Record};

/// Identifier of a check. Serializes as its bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule(pub &'static str);

impl Rule {
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

pub const RULE_EXCESSIVE_PERMISSIONS: Rule = Rule("excessive-permissions");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub rule: Rule,
    pub case: Option<String>,
    pub reasons: Vec<String>,
    /// Raw documents of the objects involved.
    pub objects: Vec<Value>,
}

impl Issue {
    pub fn new(rule: Rule) -> Self {
        Self { rule, case: None, reasons: Vec::new(), objects: Vec::new() }
    }

    pub fn case_of(mut self, case: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self
    }

    pub fn object(mut self, record: &Record) -> Self {
        self.objects.push(record.data().clone());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.case.as_deref().unwrap_or("-"))?;
        for reason in &self.reasons {
            write!(f, "\n  - {}", reason)?;
        }
        Ok(())
    }
}

/// Per-project scan output written to `result/issues.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub project: String,
    pub generated_at: DateTime<Local>,
    pub workloads: usize,
    /// Configuration files the project was loaded from, with their digests.
    pub files: Vec<LoadedFile>,
    pub issues: Vec<Issue>,
}

impl ScanReport {
    pub fn new(project: &str, workloads: usize, issues: Vec<Issue>) -> Self {
        Self {
            project: project.to_string(),
            generated_at: Local::now(),
            workloads,
            files: Vec::new(),
            issues,
        }
    }

    pub fn with_files(mut self, files: &[LoadedFile]) -> Self {
        self.files = files.to_vec();
        self
    }

    pub fn write(&self, path: &Path, pretty: bool) -> Result<()> {
        let content = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
        .context("Failed to serialize scan report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write scan report: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_serializes_flat() {
        let pod = Record::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web"}}));
        let issue = Issue::new(RULE_EXCESSIVE_PERMISSIONS)
            .case_of("Pod have EP vulnerability")
            .object(&pod)
            .reason("first")
            .reason("second");

        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(
            value,
            json!({
                "rule": "excessive-permissions",
                "case": "Pod have EP vulnerability",
                "reasons": ["first", "second"],
                "objects": [{"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web"}}],
            })
        );
    }

    #[test]
    fn test_issue_without_case() {
        let value = serde_json::to_value(Issue::new(Rule("x"))).unwrap();
        assert_eq!(value["case"], Value::Null);
        assert_eq!(Issue::new(Rule("x")).to_string(), "[x] -");
    }

    #[test]
    fn test_report_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("conf");
        std::fs::create_dir(&conf).unwrap();
        std::fs::write(conf.join("sa.yaml"), "apiVersion: v1\nkind: ServiceAccount\nmetadata: {name: web}\n").unwrap();
        let store = crate::store::RecordStore::from_config_dir(&conf).unwrap();

        let path = dir.path().join("issues.json");
        ScanReport::new("demo", 3, vec![Issue::new(RULE_EXCESSIVE_PERMISSIONS)])
            .with_files(store.loaded_files())
            .write(&path, false)
            .unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["project"], "demo");
        assert_eq!(back["issues"][0]["rule"], "excessive-permissions");

        let files = back["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0]["path"].as_str().unwrap().ends_with("sa.yaml"));
        assert_eq!(files[0]["documents"], 1);
        assert_eq!(files[0]["sha256"].as_str().unwrap().len(), 64);
    }
}
