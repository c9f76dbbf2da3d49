// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! In-memory record store.
//!
//! Holds every configuration document of one project in insertion order and
//! answers [`Query`] predicates against them. The store is built once and then
//! only read; typed views in [`crate::k8s`] borrow it for follow-up lookups.

pub mod loader;
pub mod query;
pub mod record;

use std::collections::HashMap;

pub use loader::LoadedFile;
pub use query::{field, Field, FieldPath, Query};
pub use record::Record;

use crate::error::{PolicyError, PolicyResult};

/// Ordered collection of records plus a kind index.
///
/// Record ids are insertion positions: stable for the lifetime of the store but
/// carrying no other meaning.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<Record>,
    kind_index: HashMap<String, Vec<usize>>,
    files: Vec<LoadedFile>,
    /// Synthetic `default` ServiceAccount, owned here so every lookup of it
    /// returns the same object.
    default_service_account: Record,
}

impl RecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        let mut kind_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (id, record) in records.iter().enumerate() {
            if let Some(kind) = record.kind() {
                kind_index.entry(kind.to_string()).or_default().push(id);
            }
        }
        Self {
            records,
            kind_index,
            files: Vec::new(),
            default_service_account: crate::k8s::rbac::default_service_account_record(),
        }
    }

    pub(crate) fn with_files(mut self, files: Vec<LoadedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Provenance of the files this store was loaded from (empty for in-memory stores).
    pub fn loaded_files(&self) -> &[LoadedFile] {
        &self.files
    }

    /// All records matching `query`, in insertion order.
    pub fn query(&self, query: &Query) -> Vec<&Record> {
        match query.pinned_kind() {
            Some(kind) => self
                .kind_index
                .get(kind)
                .map(|ids| {
                    ids.iter()
                        .map(|&id| &self.records[id])
                        .filter(|r| query.matches(r.data()))
                        .collect()
                })
                .unwrap_or_default(),
            None => self.records.iter().filter(|r| query.matches(r.data())).collect(),
        }
    }

    pub fn contains(&self, query: &Query) -> bool {
        !self.query(query).is_empty()
    }

    pub fn search_by_kind(&self, kind: &str) -> Vec<&Record> {
        self.query(&field(["kind"]).equals(kind))
    }

    pub fn search_by_name(&self, name: &str) -> Vec<&Record> {
        self.query(&field(["metadata", "name"]).equals(name))
    }

    /// Lookup that assumes names are unique per kind.
    pub fn search_by_kind_and_name(&self, kind: &str, name: &str) -> PolicyResult<Option<&Record>> {
        let found = self.query(&(field(["kind"]).equals(kind) & field(["metadata", "name"]).equals(name)));
        match found.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(PolicyError::Ambiguous {
                kind: kind.to_string(),
                name: name.to_string(),
                count: many.len(),
            }),
        }
    }

    pub(crate) fn default_service_account_record(&self) -> &Record {
        &self.default_service_account
    }
}

impl<'s> IntoIterator for &'s RecordStore {
    type Item = &'s Record;
    type IntoIter = std::slice::Iter<'s, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
