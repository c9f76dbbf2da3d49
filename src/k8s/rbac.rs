// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! RBAC object views and rule resolution.
//!
//! [`ServiceAccount`] → [`RoleBinding`] → [`Role`] chains are resolved lazily
//! against the [`RecordStore`]. Each view memoizes what it resolves in a
//! `OnceCell`, written once on first use and frozen afterwards. Views are
//! `!Sync`; a thread that wants to evaluate in parallel builds its own views.
//!
//! Scope classification is per rule: a rule from a `ClusterRole` is cluster
//! scoped, a rule from a `Role` is namespace scoped, and a rule with
//! `resourceNames` is additionally resource specific. `strict_scope` filters are
//! exact matches on that classification; privilege ordering between scopes is
//! applied by callers, not here.

use std::cell::OnceCell;
use std::collections::HashSet;

use serde_json::{json, Value};

use crate::error::{PolicyError, PolicyResult};
use crate::perm::PermissionScope;
use crate::store::{field, Record, RecordStore};

pub const KIND_SERVICE_ACCOUNT: &str = "ServiceAccount";
pub const KIND_ROLE: &str = "Role";
pub const KIND_CLUSTER_ROLE: &str = "ClusterRole";
pub const KIND_ROLE_BINDING: &str = "RoleBinding";
pub const KIND_CLUSTER_ROLE_BINDING: &str = "ClusterRoleBinding";

pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Record backing the synthetic `default` ServiceAccount every namespace has.
pub(crate) fn default_service_account_record() -> Record {
    Record::new(json!({
        "apiVersion": "v1",
        "kind": KIND_SERVICE_ACCOUNT,
        "metadata": {"name": DEFAULT_SERVICE_ACCOUNT, "namespace": null},
    }))
}

// ---------------------------------------------------------------------------
// Access checks
// ---------------------------------------------------------------------------

/// One "can I ...?" question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    pub api_group: &'a str,
    pub verb: &'a str,
    pub resource: &'a str,
    /// Only checked against `resourceNames` when set.
    pub resource_name: Option<&'a str>,
    /// Restrict to rules of exactly this scope classification.
    pub strict_scope: Option<PermissionScope>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(api_group: &'a str, verb: &'a str, resource: &'a str) -> Self {
        Self { api_group, verb, resource, resource_name: None, strict_scope: None }
    }

    pub fn named(mut self, resource_name: &'a str) -> Self {
        self.resource_name = Some(resource_name);
        self
    }

    pub fn scoped(mut self, scope: PermissionScope) -> Self {
        self.strict_scope = Some(scope);
        self
    }
}

/// Anything that can answer an [`AccessRequest`]: a role or a principal.
pub trait CanI {
    fn can_i(&self, request: &AccessRequest<'_>) -> PolicyResult<bool>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A normalized RBAC rule. `None` in a list field means "matches anything".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub api_groups: Option<Vec<String>>,
    pub resources: Option<Vec<String>>,
    pub verbs: Option<Vec<String>>,
    /// `None` unless the rule names specific objects.
    pub resource_names: Option<Vec<String>>,
}

impl Rule {
    /// Normalize a raw rule from `role`.
    ///
    /// Returns `Ok(None)` for `nonResourceURLs` rules, which never grant access
    /// to API resources and are dropped.
    pub fn normalize(raw: &Value, role: &str) -> PolicyResult<Option<Rule>> {
        if raw.get("nonResourceURLs").is_some() {
            tracing::debug!(role, "dropping nonResourceURLs rule");
            return Ok(None);
        }

        let resource_names = match raw.get("resourceNames").and_then(Value::as_array) {
            Some(names) if !names.is_empty() => Some(string_items(names)),
            _ => None,
        };

        Ok(Some(Rule {
            api_groups: allow_list(raw, "apiGroups", role)?,
            resources: allow_list(raw, "resources", role)?,
            verbs: allow_list(raw, "verbs", role)?,
            resource_names,
        }))
    }

    pub fn is_resource_specific(&self) -> bool {
        self.resource_names.is_some()
    }

    pub fn allows(&self, request: &AccessRequest<'_>) -> bool {
        permits(&self.api_groups, request.api_group)
            && permits(&self.resources, request.resource)
            && permits(&self.verbs, request.verb)
            && request
                .resource_name
                .map_or(true, |name| permits(&self.resource_names, name))
    }
}

fn allow_list(raw: &Value, name: &'static str, role: &str) -> PolicyResult<Option<Vec<String>>> {
    let items = raw
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| PolicyError::MalformedRule { role: role.to_string(), field: name })?;
    if items.iter().any(|v| v.as_str() == Some("*")) {
        return Ok(None);
    }
    Ok(Some(string_items(items)))
}

fn string_items(items: &[Value]) -> Vec<String> {
    items.iter().filter_map(Value::as_str).map(str::to_string).collect()
}

fn permits(allowed: &Option<Vec<String>>, value: &str) -> bool {
    match allowed {
        None => true,
        Some(list) => list.iter().any(|v| v == value),
    }
}

// ---------------------------------------------------------------------------
// Role / ClusterRole
// ---------------------------------------------------------------------------

/// View over a `Role` or `ClusterRole` record.
#[derive(Debug)]
pub struct Role<'s> {
    record: &'s Record,
    store: &'s RecordStore,
    effective: OnceCell<PolicyResult<Vec<Rule>>>,
}

impl<'s> Role<'s> {
    pub fn new(record: &'s Record, store: &'s RecordStore) -> Self {
        Self { record, store, effective: OnceCell::new() }
    }

    pub fn record(&self) -> &'s Record {
        self.record
    }

    pub fn name(&self) -> &'s str {
        self.record.name().unwrap_or("")
    }

    pub fn is_cluster(&self) -> bool {
        self.record.kind() == Some(KIND_CLUSTER_ROLE)
    }

    /// Effective rules, optionally filtered to one scope classification.
    ///
    /// `Cluster` yields nothing for a namespaced `Role`, `Namespace` yields
    /// nothing for a `ClusterRole`, and `ResourceSpecific` keeps only rules with
    /// `resourceNames` (from either kind). `Cluster` and `Namespace` drop
    /// resource-specific rules. `None` returns everything.
    pub fn list_rules(&self, scope: Option<PermissionScope>) -> PolicyResult<Vec<&Rule>> {
        match scope {
            Some(PermissionScope::Cluster) if !self.is_cluster() => return Ok(Vec::new()),
            Some(PermissionScope::Namespace) if self.is_cluster() => return Ok(Vec::new()),
            _ => {}
        }

        let rules = self.effective_rules()?;
        Ok(match scope {
            None => rules.iter().collect(),
            Some(PermissionScope::ResourceSpecific) => {
                rules.iter().filter(|r| r.is_resource_specific()).collect()
            }
            Some(_) => rules.iter().filter(|r| !r.is_resource_specific()).collect(),
        })
    }

    /// ClusterRoles selected by this role's `aggregationRule`.
    ///
    /// Only `matchLabels` selectors are understood. `matchExpressions` is
    /// rejected rather than ignored, since skipping it would under-report grants.
    pub fn find_matched_aggregation_roles(&self) -> PolicyResult<Vec<Role<'s>>> {
        Ok(matched_aggregation_records(self.record, self.store)?
            .into_iter()
            .map(|r| Role::new(r, self.store))
            .collect())
    }

    fn effective_rules(&self) -> PolicyResult<&[Rule]> {
        self.effective
            .get_or_init(|| {
                let mut rules = Vec::new();
                let mut visited = HashSet::new();
                collect_rules(self.record, self.store, &mut visited, &mut rules)?;
                Ok(rules)
            })
            .as_deref()
            .map_err(|e| e.clone())
    }
}

impl CanI for Role<'_> {
    fn can_i(&self, request: &AccessRequest<'_>) -> PolicyResult<bool> {
        Ok(self
            .list_rules(request.strict_scope)?
            .into_iter()
            .any(|rule| rule.allows(request)))
    }
}

/// Explicit rules of `record` followed by those of every aggregated ClusterRole.
/// Each role contributes once, so aggregation cycles terminate.
fn collect_rules<'s>(
    record: &'s Record,
    store: &'s RecordStore,
    visited: &mut HashSet<*const Record>,
    out: &mut Vec<Rule>,
) -> PolicyResult<()> {
    // identity, not equality: two identical roles are still two roles
    if !visited.insert(record as *const Record) {
        return Ok(());
    }

    let role_name = record.name().unwrap_or("");
    if let Some(raw_rules) = record.get(&["rules"]).and_then(Value::as_array) {
        for raw in raw_rules {
            if let Some(rule) = Rule::normalize(raw, role_name)? {
                out.push(rule);
            }
        }
    }

    if record.kind() == Some(KIND_CLUSTER_ROLE) {
        for aggregated in matched_aggregation_records(record, store)? {
            collect_rules(aggregated, store, visited, out)?;
        }
    }
    Ok(())
}

fn matched_aggregation_records<'s>(record: &'s Record, store: &'s RecordStore) -> PolicyResult<Vec<&'s Record>> {
    if record.kind() != Some(KIND_CLUSTER_ROLE) {
        return Ok(Vec::new());
    }
    let Some(selectors) = record
        .get(&["aggregationRule", "clusterRoleSelectors"])
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let role_name = record.name().unwrap_or("");
    let mut result = Vec::new();
    for selector in selectors {
        if selector.get("matchExpressions").is_some() {
            return Err(PolicyError::UnsupportedSelector {
                role: role_name.to_string(),
                construct: "matchExpressions".to_string(),
            });
        }
        let Some(labels) = selector.get("matchLabels").and_then(Value::as_object) else {
            continue;
        };

        let mut cond = field(["kind"]).equals(KIND_CLUSTER_ROLE);
        for (key, value) in labels {
            cond = cond & field(["metadata", "labels", key.as_str()]).equals(value.clone());
        }
        for matched in store.query(&cond) {
            if !result.iter().any(|r: &&Record| std::ptr::eq(*r, matched)) {
                result.push(matched);
            }
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// RoleBinding / ClusterRoleBinding
// ---------------------------------------------------------------------------

/// View over a `RoleBinding` or `ClusterRoleBinding` record.
#[derive(Debug, Clone, Copy)]
pub struct RoleBinding<'s> {
    record: &'s Record,
    store: &'s RecordStore,
}

impl<'s> RoleBinding<'s> {
    pub fn new(record: &'s Record, store: &'s RecordStore) -> Self {
        Self { record, store }
    }

    pub fn record(&self) -> &'s Record {
        self.record
    }

    pub fn name(&self) -> &'s str {
        self.record.name().unwrap_or("")
    }

    pub fn is_cluster(&self) -> bool {
        self.record.kind() == Some(KIND_CLUSTER_ROLE_BINDING)
    }

    pub fn role_ref_name(&self) -> Option<&'s str> {
        self.record.get_str(&["roleRef", "name"])
    }

    /// Roles named by `roleRef`. A dangling reference resolves to nothing.
    pub fn find_roles(&self) -> Vec<Role<'s>> {
        let Some(role_name) = self.role_ref_name() else {
            return Vec::new();
        };
        let cond = field(["kind"]).one_of([KIND_ROLE, KIND_CLUSTER_ROLE])
            & field(["metadata", "name"]).equals(role_name);
        self.store
            .query(&cond)
            .into_iter()
            .map(|r| Role::new(r, self.store))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ServiceAccount
// ---------------------------------------------------------------------------

/// View over a ServiceAccount, or over the store's synthetic `default` account.
#[derive(Debug)]
pub struct ServiceAccount<'s> {
    record: &'s Record,
    store: &'s RecordStore,
    bindings: OnceCell<Vec<RoleBinding<'s>>>,
    roles: OnceCell<Vec<Role<'s>>>,
}

impl<'s> ServiceAccount<'s> {
    pub fn new(record: &'s Record, store: &'s RecordStore) -> Self {
        Self { record, store, bindings: OnceCell::new(), roles: OnceCell::new() }
    }

    pub fn record(&self) -> &'s Record {
        self.record
    }

    pub fn name(&self) -> &'s str {
        self.record.name().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&'s str> {
        self.record.namespace()
    }

    /// True for the synthetic default account, regardless of configuration.
    pub fn is_default(&self) -> bool {
        std::ptr::eq(self.record, self.store.default_service_account_record())
    }

    /// Bindings with a `ServiceAccount` subject of this name.
    ///
    /// Subjects are matched by name only; the subject namespace is not compared.
    pub fn find_role_bindings(&self) -> &[RoleBinding<'s>] {
        self.bindings.get_or_init(|| {
            let cond = field(["kind"]).one_of([KIND_ROLE_BINDING, KIND_CLUSTER_ROLE_BINDING])
                & field(["subjects"]).any(
                    field(["kind"]).equals(KIND_SERVICE_ACCOUNT) & field(["name"]).equals(self.name()),
                );
            self.store
                .query(&cond)
                .into_iter()
                .map(|r| RoleBinding::new(r, self.store))
                .collect()
        })
    }

    /// Union of the roles referenced by [`Self::find_role_bindings`].
    pub fn find_roles(&self) -> &[Role<'s>] {
        self.roles.get_or_init(|| {
            self.find_role_bindings()
                .iter()
                .flat_map(|binding| binding.find_roles())
                .collect()
        })
    }
}

impl CanI for ServiceAccount<'_> {
    fn can_i(&self, request: &AccessRequest<'_>) -> PolicyResult<bool> {
        for role in self.find_roles() {
            if role.can_i(request)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Resolve a ServiceAccount by name.
///
/// `default` and the empty name always resolve to the store's synthetic default
/// account, whether or not the configuration declares one.
pub fn get_service_account_by_name<'s>(store: &'s RecordStore, name: &str) -> PolicyResult<ServiceAccount<'s>> {
    if name.is_empty() || name == DEFAULT_SERVICE_ACCOUNT {
        return Ok(ServiceAccount::new(store.default_service_account_record(), store));
    }
    match store.search_by_kind_and_name(KIND_SERVICE_ACCOUNT, name)? {
        Some(record) => Ok(ServiceAccount::new(record, store)),
        None => Err(PolicyError::NotFound {
            kind: KIND_SERVICE_ACCOUNT.to_string(),
            name: name.to_string(),
        }),
    }
}
