// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! On-disk project layout.
//!
//! ```text
//! <root>/
//!   <project>/
//!     conf/        Kubernetes manifests
//!     cache/       source-analysis outputs (codeql.csv, matched_pod.json)
//!     result/      issues.json
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const FILENAME_CALLSITES: &str = "codeql.csv";
pub const FILENAME_MATCHED_PODS: &str = "matched_pod.json";
pub const FILENAME_ISSUES: &str = "issues.json";

#[derive(Debug, Clone)]
pub struct ProjectFolder {
    root: PathBuf,
}

impl ProjectFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project directory names under the root, sorted.
    pub fn projects(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list projects in {}", self.root.display()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn project(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if !path.is_dir() {
            bail!("Project {} not found in {}", name, self.root.display());
        }
        Ok(path)
    }

    pub fn conf(&self, name: &str) -> Result<PathBuf> {
        Ok(self.project(name)?.join("conf"))
    }

    /// Path of a cache file. The file itself may not exist.
    pub fn cache(&self, name: &str, file: &str) -> Result<PathBuf> {
        Ok(self.project(name)?.join("cache").join(file))
    }

    /// Path of a result file, with its parent directory created.
    pub fn result(&self, name: &str, file: &str) -> Result<PathBuf> {
        ensure_parent(self.project(name)?.join("result").join(file))
    }
}

fn ensure_parent(path: PathBuf) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(path)
}
