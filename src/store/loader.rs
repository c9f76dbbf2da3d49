// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Loads Kubernetes configuration directories into a [`RecordStore`].
//!
//! Walks a directory tree for `.yaml`/`.yml` files, splits multi-document
//! files, and turns each mapping document into a [`Record`]. A file that fails
//! to parse is skipped as a whole with a warning; it never aborts the load.
//! Each loaded file is fingerprinted with SHA-256; the digests are carried into
//! the scan report.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{Record, RecordStore};

/// Metadata about a configuration file that made it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub sha256: String,
    pub documents: usize,
}

impl RecordStore {
    /// Load every YAML document under `dir` (recursively).
    pub fn from_config_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("Config directory not found: {}", dir.display());
        }

        let mut paths = Vec::new();
        collect_yaml_files(dir, &mut paths)
            .with_context(|| format!("Failed to walk config dir: {}", dir.display()))?;
        paths.sort();

        let mut records = Vec::new();
        let mut files = Vec::new();
        for path in paths {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read config file, skipping");
                    continue;
                }
            };

            let documents = match parse_documents(&content) {
                Ok(docs) => docs,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed YAML, skipping file");
                    continue;
                }
            };

            let abs = path.canonicalize().unwrap_or_else(|_| path.clone());
            let mut count = 0;
            for doc in documents {
                match doc {
                    Value::Null => continue,
                    Value::Object(_) => {}
                    other => {
                        tracing::warn!(path = %abs.display(), kind = value_kind(&other), "non-mapping document ignored");
                        continue;
                    }
                }
                let record = Record::new(doc).with_source(&abs);
                if !record.is_well_formed() {
                    tracing::debug!(path = %abs.display(), record = %record, "invalid object, keeping it flagged");
                }
                records.push(record);
                count += 1;
            }

            files.push(LoadedFile {
                path: abs,
                sha256: format!("{:x}", Sha256::digest(content.as_bytes())),
                documents: count,
            });
        }

        tracing::info!(dir = %dir.display(), files = files.len(), records = records.len(), "loaded configuration");
        Ok(RecordStore::new(records).with_files(files))
    }

    /// Build a store from YAML text held in memory (one or more documents).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let records = parse_documents(content)?
            .into_iter()
            .filter(Value::is_object)
            .map(Record::new)
            .collect();
        Ok(RecordStore::new(records))
    }
}

/// Split a (possibly multi-document) YAML string into JSON-shaped values.
/// Fails if any document is invalid, so callers can drop the file as a whole.
pub fn parse_documents(content: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for (idx, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(document)
            .with_context(|| format!("document #{}", idx + 1))?;
        docs.push(value);
    }
    Ok(docs)
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")) {
            out.push(path);
        }
    }
    Ok(())
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_DOC: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: builder
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: reader
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get"]
"#;

    #[test]
    fn test_parse_multi_document() {
        let docs = parse_documents(MULTI_DOC).unwrap();
        let objects: Vec<_> = docs.iter().filter(|d| d.is_object()).collect();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["rules"][0]["verbs"][0], "get");
    }

    #[test]
    fn test_load_dir_recurses_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("sa.yaml"), MULTI_DOC).unwrap();
        std::fs::write(
            dir.path().join("nested/deeper/pod.yml"),
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "kind: [unclosed\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "kind: Pod\n").unwrap();

        let store = RecordStore::from_config_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.loaded_files().len(), 2);
        assert!(store.loaded_files().iter().all(|f| f.sha256.len() == 64));
        let pod = store.search_by_kind("Pod")[0];
        assert!(pod.source_path().unwrap().ends_with("nested/deeper/pod.yml"));
    }

    #[test]
    fn test_malformed_object_is_kept_but_flagged() {
        let store = RecordStore::from_yaml_str("kind: Secret\nmetadata: {}\n").unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.iter().next().unwrap().is_well_formed());
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        assert!(RecordStore::from_config_dir(Path::new("/nonexistent/conf")).is_err());
    }
}
