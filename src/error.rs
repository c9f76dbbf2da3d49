// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Errors raised while evaluating RBAC policy.
//!
//! Absence of a grant is never an error: a dangling `roleRef` or an aggregation
//! selector that matches nothing simply contributes no rules. Errors are reserved
//! for constructs the evaluator refuses to approximate and for configuration
//! integrity violations. All of them are scoped to a single lookup, so callers
//! can skip the affected workload and keep going.

use thiserror::Error;

/// Policy evaluation failure.
///
/// `Clone` so memoized resolution results can hand the same error to every caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Label selector construct other than `matchLabels` (e.g. `matchExpressions`).
    #[error("unsupported label selector in ClusterRole {role}: {construct}")]
    UnsupportedSelector { role: String, construct: String },

    /// A raw rule is missing `apiGroups`, `resources` or `verbs`.
    #[error("malformed rule in {role}: missing `{field}`")]
    MalformedRule { role: String, field: &'static str },

    /// A name that must resolve to exactly one object resolved to none.
    #[error("{kind} `{name}` not found")]
    NotFound { kind: String, name: String },

    /// A name that must be unique per kind matched several objects.
    #[error("found {count} {kind} objects named `{name}`")]
    Ambiguous { kind: String, name: String, count: usize },

    /// A reference table row could not be interpreted.
    #[error("catalog {table} line {line}: {message}")]
    Catalog { table: &'static str, line: usize, message: String },
}

pub type PolicyResult<T> = std::result::Result<T, PolicyError>;
