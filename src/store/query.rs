// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Predicate language for [`RecordStore`](super::RecordStore) lookups.
//!
//! The policy model only ever needs a handful of shapes: equality on a nested
//! field, membership in a fixed set, and "some element of a sequence field
//! satisfies a sub-predicate", combined with AND/OR. A missing path never
//! matches and never errors, mirroring optional fields in the source documents.
//!
//! ```text
//! field(["subjects"]).any(
//!     field(["kind"]).equals("ServiceAccount") & field(["name"]).equals("builder"),
//! )
//! ```

use std::ops::{BitAnd, BitOr};

use serde_json::Value;

/// Nested field path. Segments are literal map keys, so label keys containing
/// dots or slashes (`rbac.example.com/aggregate-to-edit`) need no escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0
            .iter()
            .try_fold(value, |cur, seg| cur.as_object()?.get(seg.as_str()))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A predicate over a single document.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Field exists and equals the value.
    Eq(FieldPath, Value),
    /// Field exists and equals one of the values.
    OneOf(FieldPath, Vec<Value>),
    /// Field is a sequence with at least one element satisfying the sub-predicate.
    Any(FieldPath, Box<Query>),
    /// Every sub-predicate holds (vacuously true when empty).
    And(Vec<Query>),
    /// Some sub-predicate holds (false when empty).
    Or(Vec<Query>),
}

/// Start a predicate on the given field path.
pub fn field<I, S>(segments: I) -> Field
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Field(FieldPath::new(segments))
}

/// Builder half of a predicate: a path waiting for its comparison.
#[derive(Debug, Clone)]
pub struct Field(FieldPath);

impl Field {
    pub fn equals(self, value: impl Into<Value>) -> Query {
        Query::Eq(self.0, value.into())
    }

    pub fn one_of<I, V>(self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Query::OneOf(self.0, values.into_iter().map(Into::into).collect())
    }

    pub fn any(self, cond: Query) -> Query {
        Query::Any(self.0, Box::new(cond))
    }
}

impl Query {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Query::Eq(path, expected) => path.resolve(doc).is_some_and(|v| v == expected),
            Query::OneOf(path, choices) => path.resolve(doc).is_some_and(|v| choices.contains(v)),
            Query::Any(path, cond) => path
                .resolve(doc)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| cond.matches(item))),
            Query::And(conds) => conds.iter().all(|c| c.matches(doc)),
            Query::Or(conds) => conds.iter().any(|c| c.matches(doc)),
        }
    }

    /// The `kind` this predicate requires by top-level equality, if any.
    /// Used by the store to narrow candidates through its kind index.
    pub(crate) fn pinned_kind(&self) -> Option<&str> {
        match self {
            Query::Eq(path, Value::String(kind)) if path.segments() == ["kind"] => Some(kind.as_str()),
            Query::And(conds) => conds.iter().find_map(Query::pinned_kind),
            _ => None,
        }
    }

    pub fn and(self, other: Query) -> Query {
        match (self, other) {
            (Query::And(mut a), Query::And(b)) => {
                a.extend(b);
                Query::And(a)
            }
            (Query::And(mut a), q) => {
                a.push(q);
                Query::And(a)
            }
            (q, Query::And(mut b)) => {
                b.insert(0, q);
                Query::And(b)
            }
            (a, b) => Query::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Query) -> Query {
        match (self, other) {
            (Query::Or(mut a), Query::Or(b)) => {
                a.extend(b);
                Query::Or(a)
            }
            (Query::Or(mut a), q) => {
                a.push(q);
                Query::Or(a)
            }
            (q, Query::Or(mut b)) => {
                b.insert(0, q);
                Query::Or(b)
            }
            (a, b) => Query::Or(vec![a, b]),
        }
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        self.and(rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding() -> Value {
        json!({
            "kind": "RoleBinding",
            "metadata": {"name": "rb", "labels": {"rbac.example.com/aggregate": "true"}},
            "subjects": [
                {"kind": "User", "name": "alice"},
                {"kind": "ServiceAccount", "name": "builder"}
            ]
        })
    }

    #[test]
    fn test_eq_on_nested_path_with_slashed_key() {
        let q = field(["metadata", "labels", "rbac.example.com/aggregate"]).equals("true");
        assert!(q.matches(&binding()));
    }

    #[test]
    fn test_missing_path_is_non_match() {
        let q = field(["metadata", "namespace"]).equals("default");
        assert!(!q.matches(&binding()));
        let q = field(["roleRef"]).any(field(["name"]).equals("x"));
        assert!(!q.matches(&binding()));
    }

    #[test]
    fn test_any_requires_single_element_to_satisfy_all() {
        let hit = field(["subjects"])
            .any(field(["kind"]).equals("ServiceAccount") & field(["name"]).equals("builder"));
        assert!(hit.matches(&binding()));

        // kind from one element and name from another must not combine
        let miss = field(["subjects"])
            .any(field(["kind"]).equals("User") & field(["name"]).equals("builder"));
        assert!(!miss.matches(&binding()));
    }

    #[test]
    fn test_one_of_and_or() {
        let q = field(["kind"]).one_of(["Role", "RoleBinding"]);
        assert!(q.matches(&binding()));
        let q = field(["kind"]).equals("Role") | field(["kind"]).equals("ClusterRole");
        assert!(!q.matches(&binding()));
        assert!(!Query::Or(vec![]).matches(&binding()));
        assert!(Query::And(vec![]).matches(&binding()));
    }

    #[test]
    fn test_and_flattens_and_exposes_pinned_kind() {
        let q = field(["metadata", "name"]).equals("rb") & field(["kind"]).equals("RoleBinding")
            & field(["subjects"]).any(field(["kind"]).equals("User"));
        match &q {
            Query::And(conds) => assert_eq!(conds.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(q.pinned_kind(), Some("RoleBinding"));
        assert_eq!(field(["kind"]).one_of(["Role"]).pinned_kind(), None);
    }
}
