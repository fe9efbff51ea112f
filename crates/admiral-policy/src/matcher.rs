//! Rule matching: decides whether a rule applies to a resource/identity
//! pair.
//!
//! A rule applies when the resource is described by `match.resources`, the
//! requester passes `match`'s identity filter, and the pair is not
//! excluded. Exclusion is looser than matching: any non-empty part of
//! `exclude` (the resource description, roles, cluster roles or subjects)
//! that matches is enough to exclude.

use admiral_core::wildcard;
use admiral_core::{
    LabelSelector, MatchResources, RequestInfo, ResourceDescription, Rule, SelectorOperator,
    Subject, UserInfoFilter,
};
use serde_json::Value;

/// Whether `rule` applies to `resource` requested by `info`.
pub fn matches(rule: &Rule, resource: &Value, info: &RequestInfo) -> bool {
    let matched = &rule.match_resources;

    // Rejected at load time; never applies if it slips through.
    if matched.resources.kinds.is_empty() {
        tracing::debug!(rule = %rule.name, "rule has no match.resources.kinds; skipping");
        return false;
    }

    if !is_described(resource, &matched.resources) || !matches_identity(info, &matched.user_info) {
        return false;
    }

    match &rule.exclude {
        Some(exclude) => !is_excluded(resource, info, exclude),
        None => true,
    }
}

/// Whether `resource` falls under the description. Absent parts of the
/// description do not constrain.
pub fn is_described(resource: &Value, description: &ResourceDescription) -> bool {
    let kind = resource.get("kind").and_then(Value::as_str).unwrap_or_default();
    if !description.kinds.is_empty() && !description.kinds.iter().any(|k| k == kind) {
        return false;
    }

    let metadata = resource.get("metadata");

    if let Some(pattern) = &description.name {
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !wildcard::matches(pattern, name) {
            return false;
        }
    }

    if !description.namespaces.is_empty() {
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !description
            .namespaces
            .iter()
            .any(|ns| wildcard::matches(ns, namespace))
        {
            return false;
        }
    }

    if let Some(selector) = &description.selector {
        let labels = metadata.and_then(|m| m.get("labels"));
        if !matches_selector(labels, selector) {
            return false;
        }
    }

    true
}

/// Whether the requester passes the identity filter. An empty filter
/// admits everyone; otherwise any overlap with roles, cluster roles or
/// subjects is enough.
pub fn matches_identity(info: &RequestInfo, filter: &UserInfoFilter) -> bool {
    if filter.is_empty() {
        return true;
    }
    matches_roles(info, filter) || matches_subjects(info, &filter.subjects)
}

fn matches_roles(info: &RequestInfo, filter: &UserInfoFilter) -> bool {
    filter.roles.iter().any(|r| info.roles.contains(r))
        || filter
            .cluster_roles
            .iter()
            .any(|r| info.cluster_roles.contains(r))
}

fn matches_subjects(info: &RequestInfo, subjects: &[Subject]) -> bool {
    let user = &info.user_info;
    subjects.iter().any(|subject| match subject.kind.as_str() {
        "User" => subject.name == user.username,
        "Group" => user.groups.iter().any(|g| g == &subject.name),
        "ServiceAccount" => {
            let namespace = subject.namespace.as_deref().unwrap_or("default");
            user.username == format!("system:serviceaccount:{}:{}", namespace, subject.name)
        }
        _ => false,
    })
}

fn is_excluded(resource: &Value, info: &RequestInfo, exclude: &MatchResources) -> bool {
    if exclude.is_empty() {
        return false;
    }
    (!exclude.resources.is_empty() && is_described(resource, &exclude.resources))
        || matches_roles(info, &exclude.user_info)
        || matches_subjects(info, &exclude.user_info.subjects)
}

/// Evaluate a label selector against a `metadata.labels` value. An empty
/// selector matches everything.
pub fn matches_selector(labels: Option<&Value>, selector: &LabelSelector) -> bool {
    let labels_ok = selector
        .match_labels
        .iter()
        .all(|(key, value)| label(labels, key) == Some(value.as_str()));
    if !labels_ok {
        return false;
    }

    selector.match_expressions.iter().all(|req| {
        let current = label(labels, &req.key);
        match req.operator {
            SelectorOperator::In => current.is_some_and(|v| req.values.iter().any(|x| x == v)),
            SelectorOperator::NotIn => current.is_none_or(|v| !req.values.iter().any(|x| x == v)),
            SelectorOperator::Exists => current.is_some(),
            SelectorOperator::DoesNotExist => current.is_none(),
        }
    })
}

fn label<'a>(labels: Option<&'a Value>, key: &str) -> Option<&'a str> {
    labels?.get(key)?.as_str()
}
